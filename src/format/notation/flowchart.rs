// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use log::debug;
use serde_json::json;

use super::ident::validate_ident;
use super::{
    export_ident, is_comment, ExportedNotation, ImportedGraph, NotationCodec,
    NotationExportError, NotationMetadata, NotationParseError,
};
use crate::layout::{self, LayoutDirection, LayoutEdge, LayoutOptions};
use crate::model::{
    kinds, Bounds, Connector, ConnectorId, DiagramKind, EndMarker, LineStyle, Shape, ShapeId,
};

/// Space between a group's border and its members.
const GROUP_PADDING: f64 = 20.0;

fn node_id(ident: &str) -> ShapeId {
    ShapeId::generated(format!("n:{ident}"))
}

fn group_id(ident: &str) -> ShapeId {
    ShapeId::generated(format!("g:{ident}"))
}

fn edge_id_from_index(index: usize) -> ConnectorId {
    ConnectorId::generated(format!("e:{index:04}"))
}

fn is_edge_op_start_char(ch: char) -> bool {
    matches!(ch, '<' | '-' | '=' | '.')
}

fn is_edge_op_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | '-' | '=' | '.' | 'o')
}

fn is_probable_edge_operator(op: &str) -> bool {
    op.chars().filter(|ch| matches!(ch, '-' | '=' | '.')).count() >= 2
}

/// Splits `line` at its first edge operator, skipping bracketed labels.
fn split_once_edge_operator(line: &str) -> Option<(&str, &str, &str)> {
    let mut in_label: Option<char> = None;
    let mut op_start: Option<usize> = None;

    for (idx, ch) in line.char_indices() {
        if let Some(close) = in_label {
            if ch == close {
                in_label = None;
            }
            continue;
        }

        match ch {
            '[' => in_label = Some(']'),
            '(' => in_label = Some(')'),
            '{' => in_label = Some('}'),
            _ if is_edge_op_start_char(ch) => {
                op_start = Some(idx);
                break;
            }
            _ => {}
        }
    }

    let start = op_start?;
    let end = line[start..]
        .char_indices()
        .find(|(_, ch)| !is_edge_op_char(*ch))
        .map(|(idx, _)| start + idx)
        .unwrap_or(line.len());

    let (lhs, op, rhs) = (&line[..start], &line[start..end], &line[end..]);
    if lhs.trim().is_empty() || !is_probable_edge_operator(op) {
        return None;
    }
    Some((lhs, op, rhs))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeStyle {
    reversed: bool,
    start: EndMarker,
    end: EndMarker,
    line: LineStyle,
}

/// Decodes an operator such as `-->`, `---`, `<-->`, `-.->`, `==>` or `--o`.
fn decode_operator(op: &str) -> EdgeStyle {
    let has_left = op.starts_with('<');
    let has_right = op.ends_with('>');
    let end = if has_right {
        EndMarker::Arrow
    } else if op.ends_with('o') {
        EndMarker::Circle
    } else {
        EndMarker::None
    };
    let line = if op.contains('.') { LineStyle::Dotted } else { LineStyle::Solid };

    // A bare `<--` points backwards; `<-->` and `<--o` keep their direction and mark both ends.
    match (has_left, end) {
        (true, EndMarker::None) => {
            EdgeStyle { reversed: true, start: EndMarker::None, end: EndMarker::Arrow, line }
        }
        (true, end) => EdgeStyle { reversed: false, start: EndMarker::Arrow, end, line },
        (false, end) => EdgeStyle { reversed: false, start: EndMarker::None, end, line },
    }
}

fn encode_operator(connector: &Connector) -> String {
    let mut op = String::with_capacity(5);
    if connector.start_marker() != EndMarker::None {
        op.push('<');
    }
    let solid = connector.line_style() == LineStyle::Solid;
    op.push_str(if solid { "--" } else { "-.-" });
    match connector.end_marker() {
        EndMarker::None if solid => op.push('-'),
        EndMarker::None => {}
        EndMarker::Circle => op.push('o'),
        EndMarker::Arrow | EndMarker::OpenArrow | EndMarker::Diamond => op.push('>'),
    }
    op
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeShape {
    Rect,
    Round,
    Diamond,
}

impl NodeShape {
    fn kind(self) -> &'static str {
        match self {
            Self::Rect => kinds::RECT,
            Self::Round => kinds::ROUND,
            Self::Diamond => kinds::DIAMOND,
        }
    }

    fn from_kind(kind: &str) -> Self {
        match kind {
            kinds::ROUND => Self::Round,
            kinds::DIAMOND => Self::Diamond,
            _ => Self::Rect,
        }
    }

    fn delimiters(self) -> (char, char) {
        match self {
            Self::Rect => ('[', ']'),
            Self::Round => ('(', ')'),
            Self::Diamond => ('{', '}'),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeSpec {
    ident: String,
    label: Option<String>,
    shape: Option<NodeShape>,
}

fn parse_node_spec(token: &str, line_no: usize) -> Result<NodeSpec, NotationParseError> {
    let trimmed = token.trim();
    let open = trimmed.char_indices().find(|(_, ch)| matches!(ch, '[' | '(' | '{'));

    let Some((open_idx, open_ch)) = open else {
        validate_ident(trimmed).map_err(|reason| NotationParseError::InvalidIdentifier {
            line_no,
            name: trimmed.to_owned(),
            reason,
        })?;
        return Ok(NodeSpec { ident: trimmed.to_owned(), label: None, shape: None });
    };

    let shape = match open_ch {
        '(' => NodeShape::Round,
        '{' => NodeShape::Diamond,
        _ => NodeShape::Rect,
    };
    let (_, close_ch) = shape.delimiters();

    let ident = trimmed[..open_idx].trim();
    validate_ident(ident).map_err(|reason| NotationParseError::InvalidIdentifier {
        line_no,
        name: ident.to_owned(),
        reason,
    })?;

    let Some(label_raw) = trimmed[open_idx + open_ch.len_utf8()..].strip_suffix(close_ch) else {
        return Err(NotationParseError::UnsupportedSyntax { line_no, line: trimmed.to_owned() });
    };
    let label = label_raw.trim();
    if label.is_empty() {
        return Err(NotationParseError::EmptyLabel { line_no, token: trimmed.to_owned() });
    }

    Ok(NodeSpec { ident: ident.to_owned(), label: Some(label.to_owned()), shape: Some(shape) })
}

#[derive(Debug, Clone)]
struct FlowNode {
    label: String,
    explicit_label: bool,
    shape: NodeShape,
    group: Option<String>,
}

#[derive(Debug, Clone)]
struct FlowGroup {
    ident: String,
    label: String,
    parent: Option<String>,
}

#[derive(Debug, Clone)]
struct FlowEdge {
    from: String,
    to: String,
    label: Option<String>,
    style: EdgeStyle,
}

#[derive(Debug, Default)]
struct FlowGraph {
    order: Vec<String>,
    nodes: BTreeMap<String, FlowNode>,
    groups: Vec<FlowGroup>,
    edges: Vec<FlowEdge>,
}

impl FlowGraph {
    /// Declares or refines a node. The first mention decides group membership; a later explicit
    /// label may replace an implicit one but never a different explicit one.
    fn ensure_node(
        &mut self,
        spec: NodeSpec,
        group: Option<&String>,
        line_no: usize,
    ) -> Result<String, NotationParseError> {
        let NodeSpec { ident, label, shape } = spec;

        let Some(existing) = self.nodes.get_mut(&ident) else {
            self.order.push(ident.clone());
            self.nodes.insert(
                ident.clone(),
                FlowNode {
                    explicit_label: label.is_some(),
                    label: label.unwrap_or_else(|| ident.clone()),
                    shape: shape.unwrap_or(NodeShape::Rect),
                    group: group.cloned(),
                },
            );
            return Ok(ident);
        };

        if let Some(label) = label {
            if existing.explicit_label && existing.label != label {
                return Err(NotationParseError::ConflictingLabel {
                    line_no,
                    ident,
                    existing: existing.label.clone(),
                    new: label,
                });
            }
            existing.label = label;
            existing.explicit_label = true;
        }
        if let Some(shape) = shape {
            existing.shape = shape;
        }
        Ok(ident)
    }
}

fn parse_direction(
    direction: Option<&str>,
    line_no: usize,
) -> Result<Option<LayoutDirection>, NotationParseError> {
    match direction {
        None => Ok(None),
        Some("LR" | "RL") => Ok(Some(LayoutDirection::LeftToRight)),
        Some("TD" | "TB" | "BT") => Ok(Some(LayoutDirection::TopToBottom)),
        Some(other) => {
            Err(NotationParseError::InvalidDirection { line_no, direction: other.to_owned() })
        }
    }
}

fn is_ignorable_line(trimmed: &str) -> bool {
    ["style ", "class ", "classDef ", "click ", "linkStyle "]
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

fn parse_edge_label<'a>(
    rest: &'a str,
    line_no: usize,
    line: &str,
) -> Result<(Option<String>, &'a str), NotationParseError> {
    let rest = rest.trim_start();
    let Some(after) = rest.strip_prefix('|') else {
        return Ok((None, rest));
    };
    let Some(end_idx) = after.find('|') else {
        return Err(NotationParseError::UnsupportedSyntax { line_no, line: line.to_owned() });
    };
    let label = after[..end_idx].trim();
    if label.is_empty() {
        return Err(NotationParseError::EmptyLabel { line_no, token: line.to_owned() });
    }
    Ok((Some(label.to_owned()), after[end_idx + 1..].trim_start()))
}

fn parse(text: &str) -> Result<(FlowGraph, Option<LayoutDirection>), NotationParseError> {
    let mut graph = FlowGraph::default();
    let mut direction = None;
    let mut saw_header = false;
    let mut open_groups = Vec::<(String, usize)>::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || is_comment(trimmed) {
            continue;
        }

        if !saw_header {
            let mut parts = trimmed.split_whitespace();
            if !matches!(parts.next(), Some("flowchart" | "graph")) {
                return Err(NotationParseError::MissingHeader);
            }
            direction = parse_direction(parts.next(), line_no)?;
            if parts.next().is_some() {
                return Err(NotationParseError::UnsupportedSyntax {
                    line_no,
                    line: trimmed.to_owned(),
                });
            }
            saw_header = true;
            continue;
        }

        let current_group = open_groups.last().map(|(ident, _)| ident);

        if let Some(rest) = trimmed.strip_prefix("subgraph ") {
            let spec = parse_node_spec(rest, line_no)?;
            if graph.groups.iter().any(|g| g.ident == spec.ident) {
                return Err(NotationParseError::UnsupportedSyntax {
                    line_no,
                    line: trimmed.to_owned(),
                });
            }
            graph.groups.push(FlowGroup {
                label: spec.label.unwrap_or_else(|| spec.ident.clone()),
                parent: current_group.cloned(),
                ident: spec.ident.clone(),
            });
            open_groups.push((spec.ident, line_no));
            continue;
        }

        if trimmed == "end" {
            if open_groups.pop().is_none() {
                return Err(NotationParseError::UnexpectedEnd { line_no });
            }
            continue;
        }

        if is_ignorable_line(trimmed) {
            continue;
        }

        let Some((first_raw, first_op, tail)) = split_once_edge_operator(trimmed) else {
            let spec = parse_node_spec(trimmed, line_no)?;
            graph.ensure_node(spec, current_group, line_no)?;
            continue;
        };

        let current_group = current_group.cloned();
        let mut current = parse_node_spec(first_raw, line_no)?;
        let mut op = first_op;
        let mut rest = tail;

        loop {
            let (label, rhs_and_more) = parse_edge_label(rest, line_no, trimmed)?;
            let (rhs_raw, next) = match split_once_edge_operator(rhs_and_more) {
                Some((rhs_raw, next_op, next_rest)) => (rhs_raw, Some((next_op, next_rest))),
                None => (rhs_and_more, None),
            };
            let rhs = parse_node_spec(rhs_raw, line_no)?;

            let style = decode_operator(op);
            let lhs_ident = graph.ensure_node(current, current_group.as_ref(), line_no)?;
            let rhs_ident = graph.ensure_node(rhs.clone(), current_group.as_ref(), line_no)?;
            let (from, to) =
                if style.reversed { (rhs_ident, lhs_ident) } else { (lhs_ident, rhs_ident) };
            graph.edges.push(FlowEdge { from, to, label, style });

            let Some((next_op, next_rest)) = next else {
                break;
            };
            current = NodeSpec { label: None, shape: None, ..rhs };
            op = next_op;
            rest = next_rest;
        }
    }

    if !saw_header {
        return Err(NotationParseError::MissingHeader);
    }
    if let Some((ident, line_no)) = open_groups.pop() {
        return Err(NotationParseError::UnclosedSubgraph { line_no, ident });
    }

    Ok((graph, direction))
}

/// Parses a flowchart and lays it out with the rank layout before building shapes.
pub(super) fn import(
    text: &str,
    codec: &NotationCodec,
) -> Result<ImportedGraph, NotationParseError> {
    let (graph, direction) = parse(text)?;

    let options = LayoutOptions {
        direction: direction.unwrap_or(codec.layout_options().direction),
        ..*codec.layout_options()
    };
    let node_ids = graph.order.iter().map(|ident| node_id(ident)).collect::<Vec<_>>();
    let layout_edges = graph
        .edges
        .iter()
        .map(|edge| {
            let (from, to) = (node_id(&edge.from), node_id(&edge.to));
            if edge.style.start != EndMarker::None && edge.style.end != EndMarker::None {
                LayoutEdge::bidirectional(from, to)
            } else {
                LayoutEdge::directed(from, to)
            }
        })
        .collect::<Vec<_>>();
    let placed = layout::layout(&node_ids, &layout_edges, &options);

    let mut shapes = Vec::with_capacity(graph.order.len() + graph.groups.len());
    let mut member_bounds = BTreeMap::<String, Bounds>::new();
    for (ident, id) in graph.order.iter().zip(node_ids) {
        let Some(node) = graph.nodes.get(ident) else {
            continue;
        };
        let origin = placed.placement(&id).map(|p| p.position()).unwrap_or(options.origin);
        let bounds = Bounds::from_parts(origin, codec.node_size());
        let mut shape =
            Shape::new(id, node.shape.kind(), bounds).with_data(json!({ "label": node.label }));
        if let Some(group) = &node.group {
            shape = shape.with_parent(group_id(group));
            grow(&mut member_bounds, group, bounds);
        }
        shapes.push(shape);
    }

    // Children are declared after their parent, so walking backwards sizes inner groups first.
    let mut groups = Vec::with_capacity(graph.groups.len());
    for group in graph.groups.iter().rev() {
        let bounds = member_bounds
            .get(&group.ident)
            .map(|b| b.expand(GROUP_PADDING))
            .unwrap_or_else(|| Bounds::from_parts(options.origin, codec.node_size()));
        let mut shape = Shape::new(group_id(&group.ident), kinds::GROUP, bounds)
            .with_data(json!({ "label": group.label }));
        if let Some(parent) = &group.parent {
            shape = shape.with_parent(group_id(parent));
            grow(&mut member_bounds, parent, bounds);
        }
        groups.push(shape);
    }
    groups.reverse();
    shapes.extend(groups);

    let connectors = graph
        .edges
        .into_iter()
        .enumerate()
        .map(|(idx, edge)| {
            let connector = Connector::new(
                edge_id_from_index(idx + 1),
                node_id(&edge.from),
                node_id(&edge.to),
            )
            .with_markers(edge.style.start, edge.style.end)
            .with_line_style(edge.style.line);
            match edge.label {
                Some(label) => connector.with_label(label),
                None => connector,
            }
        })
        .collect::<Vec<_>>();

    debug!(shapes = shapes.len(), connectors = connectors.len(); "imported flowchart notation");
    Ok(ImportedGraph::new(DiagramKind::Flowchart, shapes, connectors))
}

fn grow(member_bounds: &mut BTreeMap<String, Bounds>, group: &str, bounds: Bounds) {
    member_bounds
        .entry(group.to_owned())
        .and_modify(|existing| *existing = existing.union(bounds))
        .or_insert(bounds);
}

fn valid_node_label(label: &str, closing: char) -> bool {
    !label.contains(closing) && !label.contains('\n') && !label.contains('\r')
}

fn valid_edge_label(label: &str) -> bool {
    !label.contains('|') && !label.contains('\n') && !label.contains('\r')
}

struct FlowExport<'a> {
    shapes: &'a [&'a Shape],
    idents: BTreeMap<&'a ShapeId, String>,
    out: String,
}

impl FlowExport<'_> {
    fn is_root(&self, shape: &Shape) -> bool {
        shape.parent_id().map_or(true, |parent| !self.idents.contains_key(parent))
    }

    fn emit(&mut self, parent: Option<&ShapeId>, depth: usize) -> Result<(), NotationExportError> {
        let shapes = self.shapes;
        for shape in shapes {
            let belongs = match parent {
                None => self.is_root(shape),
                Some(parent) => shape.parent_id() == Some(parent),
            };
            if !belongs {
                continue;
            }

            let ident = self.idents.get(shape.id()).cloned().unwrap_or_default();
            let label = shape.label().unwrap_or(&ident).to_owned();
            let indent = "  ".repeat(depth + 1);

            if shape.kind() == kinds::GROUP {
                if !valid_node_label(&label, ']') {
                    return Err(NotationExportError::InvalidLabel {
                        shape_id: shape.id().clone(),
                        label,
                    });
                }
                self.out.push_str(&format!("{indent}subgraph {ident}[{label}]\n"));
                self.emit(Some(shape.id()), depth + 1)?;
                self.out.push_str(&format!("{indent}end\n"));
                continue;
            }

            let node_shape = NodeShape::from_kind(shape.kind());
            let (open, close) = node_shape.delimiters();
            if !valid_node_label(&label, close) {
                return Err(NotationExportError::InvalidLabel {
                    shape_id: shape.id().clone(),
                    label,
                });
            }
            if node_shape == NodeShape::Rect && label == ident {
                self.out.push_str(&format!("{indent}{ident}\n"));
            } else {
                self.out.push_str(&format!("{indent}{ident}{open}{label}{close}\n"));
            }
        }
        Ok(())
    }
}

/// Exports shapes and connectors as a flowchart. Groups become (nested) subgraphs; connectors
/// are emitted in input order.
pub(super) fn export(
    codec: &NotationCodec,
    shapes: &[&Shape],
    connectors: &[&Connector],
) -> Result<ExportedNotation, NotationExportError> {
    let mut metadata = NotationMetadata::default();
    let mut idents = BTreeMap::<&ShapeId, String>::new();
    for (idx, shape) in shapes.iter().enumerate() {
        let ident = export_ident(shape.id(), idx + 1, &metadata.node_ids);
        metadata.node_ids.insert(ident.clone(), shape.id().clone());
        idents.insert(shape.id(), ident);
    }

    let header = match codec.layout_options().direction {
        LayoutDirection::LeftToRight => "flowchart LR\n",
        LayoutDirection::TopToBottom => "flowchart TD\n",
    };
    let mut export = FlowExport { shapes, idents, out: header.to_owned() };
    export.emit(None, 0)?;

    for connector in connectors {
        let from = export.idents.get(connector.source_shape_id()).cloned().unwrap_or_default();
        let to = export.idents.get(connector.target_shape_id()).cloned().unwrap_or_default();
        let op = encode_operator(connector);
        match connector.label() {
            Some(label) if !valid_edge_label(label) => {
                return Err(NotationExportError::InvalidConnectorLabel {
                    connector_id: connector.id().clone(),
                    label: label.to_owned(),
                });
            }
            Some(label) => export.out.push_str(&format!("  {from} {op}|{label}| {to}\n")),
            None => export.out.push_str(&format!("  {from} {op} {to}\n")),
        }
        metadata.connector_ids.push(connector.id().clone());
    }

    Ok(ExportedNotation { kind: DiagramKind::Flowchart, syntax: export.out, metadata })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{decode_operator, encode_operator, split_once_edge_operator};
    use crate::format::notation::{NotationCodec, NotationParseError};
    use crate::model::fixtures::{cid, edge, sid};
    use crate::model::{kinds, Bounds, Connector, EndMarker, LineStyle, Point, Shape};

    fn codec() -> NotationCodec {
        NotationCodec::default()
    }

    #[test]
    fn imports_nodes_edges_and_labels() {
        let graph = codec()
            .import("flowchart LR\n  a[Start] -->|go| b(Work)\n  b --> c{Done?}\n  d\n")
            .expect("import");

        let ids = graph.shapes().iter().map(|s| s.id().as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["n:a", "n:b", "n:c", "n:d"]);
        assert_eq!(graph.shapes()[1].kind(), kinds::ROUND);
        assert_eq!(graph.shapes()[2].kind(), kinds::DIAMOND);
        assert_eq!(graph.shapes()[2].label(), Some("Done?"));
        assert_eq!(graph.shapes()[3].label(), Some("d"));

        assert_eq!(graph.connectors().len(), 2);
        assert_eq!(graph.connectors()[0].id(), &cid("e:0001"));
        assert_eq!(graph.connectors()[0].label(), Some("go"));
        assert_eq!(graph.connectors()[1].source_shape_id(), &sid("n:b"));
    }

    #[test]
    fn imported_nodes_are_ranked_left_to_right() {
        let graph = codec().import("flowchart LR\n a --> b --> c\n").expect("import");
        let xs = graph.shapes().iter().map(|s| s.position().x()).collect::<Vec<_>>();
        assert_eq!(xs, [0.0, 220.0, 440.0]);
        assert!(graph.shapes().iter().all(|s| s.position().y() == 0.0));
    }

    #[test]
    fn top_down_header_switches_the_rank_axis() {
        let graph = codec().import("graph TD\n a --> b\n").expect("import");
        assert_eq!(graph.shapes()[1].position(), Point::new(0.0, 220.0));
    }

    #[rstest]
    #[case("-->", EndMarker::None, EndMarker::Arrow, LineStyle::Solid)]
    #[case("---", EndMarker::None, EndMarker::None, LineStyle::Solid)]
    #[case("<-->", EndMarker::Arrow, EndMarker::Arrow, LineStyle::Solid)]
    #[case("-.->", EndMarker::None, EndMarker::Arrow, LineStyle::Dotted)]
    #[case("==>", EndMarker::None, EndMarker::Arrow, LineStyle::Solid)]
    #[case("--o", EndMarker::None, EndMarker::Circle, LineStyle::Solid)]
    #[case("<--o", EndMarker::Arrow, EndMarker::Circle, LineStyle::Solid)]
    #[case("<-.-o", EndMarker::Arrow, EndMarker::Circle, LineStyle::Dotted)]
    fn operators_decode_to_markers_and_line_style(
        #[case] op: &str,
        #[case] start: EndMarker,
        #[case] end: EndMarker,
        #[case] line: LineStyle,
    ) {
        let style = decode_operator(op);
        assert_eq!((style.start, style.end, style.line), (start, end, line));
    }

    #[test]
    fn reverse_arrows_swap_endpoints() {
        let graph = codec().import("flowchart\n a <-- b\n").expect("import");
        let connector = &graph.connectors()[0];
        assert_eq!(connector.source_shape_id(), &sid("n:b"));
        assert_eq!(connector.target_shape_id(), &sid("n:a"));
    }

    #[test]
    fn subgraphs_become_groups_around_their_members() {
        let graph = codec()
            .import("flowchart LR\n subgraph api[API]\n  a --> b\n end\n c\n")
            .expect("import");

        let group = graph.shapes().iter().find(|s| s.kind() == kinds::GROUP).expect("group");
        assert_eq!(group.id(), &sid("g:api"));
        assert_eq!(group.label(), Some("API"));

        let a = graph.shapes().iter().find(|s| s.id() == &sid("n:a")).expect("a");
        let c = graph.shapes().iter().find(|s| s.id() == &sid("n:c")).expect("c");
        assert_eq!(a.parent_id(), Some(&sid("g:api")));
        assert_eq!(c.parent_id(), None);
        assert!(group.bounds().x() < a.bounds().x());
        assert!(group.bounds().right() > a.bounds().right());
    }

    #[test]
    fn conflicting_explicit_labels_are_rejected() {
        let err = codec().import("flowchart\n a[One]\n a[Two]\n").expect_err("conflict");
        assert!(matches!(err, NotationParseError::ConflictingLabel { line_no: 3, .. }));
    }

    #[test]
    fn unbalanced_subgraphs_are_rejected() {
        assert_eq!(
            codec().import("flowchart\n end\n").expect_err("stray end"),
            NotationParseError::UnexpectedEnd { line_no: 2 }
        );
        assert!(matches!(
            codec().import("flowchart\n subgraph g\n a\n").expect_err("unclosed"),
            NotationParseError::UnclosedSubgraph { line_no: 2, .. }
        ));
    }

    #[test]
    fn invalid_identifiers_and_directions_are_rejected() {
        assert!(matches!(
            codec().import("flowchart\n a-b[x]\n").expect_err("ident"),
            NotationParseError::UnsupportedSyntax { .. }
                | NotationParseError::InvalidIdentifier { .. }
        ));
        assert!(matches!(
            codec().import("flowchart XY\n").expect_err("direction"),
            NotationParseError::InvalidDirection { line_no: 1, .. }
        ));
    }

    #[test]
    fn edge_operator_split_skips_bracketed_labels() {
        assert_eq!(split_once_edge_operator("a[x-->y] --> b"), Some(("a[x-->y] ", "-->", " b")));
        assert_eq!(split_once_edge_operator("lonely"), None);
    }

    #[test]
    fn export_writes_subgraphs_and_operators() {
        let group = Shape::new(sid("grp"), kinds::GROUP, Bounds::new(0.0, 0.0, 300.0, 200.0))
            .with_data(serde_json::json!({ "label": "Backend" }));
        let api = Shape::new(sid("api"), kinds::ROUND, Bounds::new(10.0, 10.0, 100.0, 50.0))
            .with_data(serde_json::json!({ "label": "API" }))
            .with_parent(sid("grp"));
        let db = Shape::new(sid("db"), kinds::RECT, Bounds::new(200.0, 10.0, 100.0, 50.0));
        let link = edge("c1", "api", "db").with_line_style(LineStyle::Dotted).with_label("reads");

        let exported = codec().export([&group, &api, &db], [&link]).expect("export");
        assert_eq!(
            exported.syntax,
            concat!(
                "flowchart LR\n  subgraph grp[Backend]\n    api(API)\n  end\n",
                "  db\n  api -.->|reads| db\n",
            )
        );
        assert_eq!(exported.metadata.node_ids["api"], sid("api"));
        assert_eq!(exported.metadata.connector_ids, vec![cid("c1")]);
    }

    #[test]
    fn export_then_import_preserves_structure() {
        let original = codec()
            .import("flowchart LR\n subgraph s[Svc]\n  a[Alpha] <--> b\n end\n b --o c\n")
            .expect("import");
        let exported =
            codec().export(original.shapes(), original.connectors()).expect("export");
        let reimported = codec().import(&exported.syntax).expect("reimport");

        assert_eq!(reimported.shapes().len(), original.shapes().len());
        assert_eq!(reimported.connectors().len(), original.connectors().len());
        assert!(reimported.connectors()[0].is_bidirectional());
        assert_eq!(reimported.connectors()[1].end_marker(), EndMarker::Circle);
        assert_eq!(encode_operator(&reimported.connectors()[1]), "--o");
    }

    #[test]
    fn start_arrow_with_circle_end_survives_export() {
        let connector = Connector::new(cid("c1"), sid("a"), sid("b"))
            .with_markers(EndMarker::Arrow, EndMarker::Circle);
        assert_eq!(encode_operator(&connector), "<--o");

        let graph = codec().import("flowchart\n a <--o b\n").expect("import");
        let decoded = &graph.connectors()[0];
        assert_eq!(decoded.source_shape_id(), &sid("n:a"));
        let markers = (decoded.start_marker(), decoded.end_marker());
        assert_eq!(markers, (EndMarker::Arrow, EndMarker::Circle));
        assert_eq!(encode_operator(decoded), "<--o");
    }

    #[test]
    fn export_rejects_labels_that_cannot_round_trip() {
        let shape = Shape::new(sid("a"), kinds::RECT, Bounds::new(0.0, 0.0, 1.0, 1.0))
            .with_data(serde_json::json!({ "label": "bad]label" }));
        assert!(codec().export([&shape], Vec::<&Connector>::new()).is_err());
    }
}
