// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde_json::json;

use super::ident::validate_ident;
use super::{
    export_ident, is_comment, ExportedNotation, ImportedGraph, NotationCodec,
    NotationExportError, NotationMetadata, NotationParseError,
};
use crate::layout::message_y;
use crate::model::{
    kinds, Bounds, Connector, ConnectorId, DiagramKind, EndMarker, LineStyle, Point, Shape,
    ShapeId,
};

fn participant_id(ident: &str) -> ShapeId {
    ShapeId::generated(format!("p:{ident}"))
}

fn message_id_from_index(index: usize) -> ConnectorId {
    ConnectorId::generated(format!("m:{index:04}"))
}

fn message_regex() -> &'static Regex {
    static MESSAGE: OnceLock<Regex> = OnceLock::new();
    MESSAGE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<from>[^\s:+\-]+?)\s*",
            r"(?P<arrow>-->>|->>|--\)|-\)|-->|->)\s*[+-]?\s*",
            r"(?P<to>[^\s:]+)\s*(?::\s*(?P<text>.*))?$",
        ))
        .expect("message pattern compiles")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrow {
    /// `->>`
    Call,
    /// `-->>`
    Reply,
    /// `-)`
    Async,
    /// `--)`
    AsyncReply,
    /// `->`
    Line,
    /// `-->`
    DashedLine,
}

impl Arrow {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "->>" => Self::Call,
            "-->>" => Self::Reply,
            "-)" => Self::Async,
            "--)" => Self::AsyncReply,
            "->" => Self::Line,
            "-->" => Self::DashedLine,
            _ => return None,
        })
    }

    fn of(connector: &Connector) -> Self {
        let solid = connector.line_style() == LineStyle::Solid;
        match (solid, connector.end_marker()) {
            (true, EndMarker::OpenArrow) => Self::Async,
            (false, EndMarker::OpenArrow) => Self::AsyncReply,
            (true, EndMarker::None) => Self::Line,
            (false, EndMarker::None) => Self::DashedLine,
            (true, _) => Self::Call,
            (false, _) => Self::Reply,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Self::Call => "->>",
            Self::Reply => "-->>",
            Self::Async => "-)",
            Self::AsyncReply => "--)",
            Self::Line => "->",
            Self::DashedLine => "-->",
        }
    }

    fn line_style(self) -> LineStyle {
        match self {
            Self::Call | Self::Async | Self::Line => LineStyle::Solid,
            Self::Reply | Self::AsyncReply | Self::DashedLine => LineStyle::Dashed,
        }
    }

    fn end_marker(self) -> EndMarker {
        match self {
            Self::Call | Self::Reply => EndMarker::Arrow,
            Self::Async | Self::AsyncReply => EndMarker::OpenArrow,
            Self::Line | Self::DashedLine => EndMarker::None,
        }
    }
}

#[derive(Debug, Clone)]
struct Participant {
    ident: String,
    label: String,
    explicit_label: bool,
    actor: bool,
}

#[derive(Debug, Clone)]
struct Message {
    from: String,
    to: String,
    arrow: Arrow,
    text: Option<String>,
}

#[derive(Debug, Default)]
struct SequenceGraph {
    participants: Vec<Participant>,
    messages: Vec<Message>,
}

impl SequenceGraph {
    fn ensure_participant(
        &mut self,
        ident: &str,
        label: Option<&str>,
        actor: bool,
        line_no: usize,
    ) -> Result<(), NotationParseError> {
        validate_ident(ident).map_err(|reason| NotationParseError::InvalidIdentifier {
            line_no,
            name: ident.to_owned(),
            reason,
        })?;

        let Some(existing) = self.participants.iter_mut().find(|p| p.ident == ident) else {
            self.participants.push(Participant {
                ident: ident.to_owned(),
                label: label.unwrap_or(ident).to_owned(),
                explicit_label: label.is_some(),
                actor,
            });
            return Ok(());
        };

        if let Some(label) = label {
            if existing.explicit_label && existing.label != label {
                return Err(NotationParseError::ConflictingLabel {
                    line_no,
                    ident: ident.to_owned(),
                    existing: existing.label.clone(),
                    new: label.to_owned(),
                });
            }
            existing.label = label.to_owned();
            existing.explicit_label = true;
        }
        existing.actor |= actor;
        Ok(())
    }
}

/// Lines accepted for compatibility but without effect on the imported graph. Activations are
/// derived from message topology, so explicit activation markers are dropped too.
fn is_ignorable_line(trimmed: &str) -> bool {
    let keyword = trimmed.split_whitespace().next().unwrap_or_default();
    matches!(
        keyword,
        "autonumber"
            | "activate"
            | "deactivate"
            | "title"
            | "loop"
            | "alt"
            | "else"
            | "opt"
            | "par"
            | "and"
            | "critical"
            | "break"
            | "rect"
            | "end"
    ) || keyword.starts_with("note") || keyword.starts_with("Note")
}

fn parse_participant(
    graph: &mut SequenceGraph,
    rest: &str,
    actor: bool,
    line_no: usize,
    line: &str,
) -> Result<(), NotationParseError> {
    let (ident, label) = match rest.split_once(" as ") {
        Some((ident, label)) => (ident.trim(), Some(label.trim())),
        None => (rest.trim(), None),
    };
    if label == Some("") {
        return Err(NotationParseError::EmptyLabel { line_no, token: line.to_owned() });
    }
    graph.ensure_participant(ident, label, actor, line_no)
}

fn parse(text: &str) -> Result<SequenceGraph, NotationParseError> {
    let mut graph = SequenceGraph::default();
    let mut saw_header = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || is_comment(trimmed) {
            continue;
        }

        if !saw_header {
            if trimmed != "sequenceDiagram" {
                return Err(NotationParseError::MissingHeader);
            }
            saw_header = true;
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("participant ") {
            parse_participant(&mut graph, rest, false, line_no, trimmed)?;
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("actor ") {
            parse_participant(&mut graph, rest, true, line_no, trimmed)?;
            continue;
        }
        if is_ignorable_line(trimmed) {
            continue;
        }

        let Some(caps) = message_regex().captures(trimmed) else {
            return Err(NotationParseError::UnsupportedSyntax { line_no, line: trimmed.to_owned() });
        };
        let (from, to) = (&caps["from"], &caps["to"]);
        let Some(arrow) = Arrow::parse(&caps["arrow"]) else {
            return Err(NotationParseError::UnsupportedSyntax { line_no, line: trimmed.to_owned() });
        };
        graph.ensure_participant(from, None, false, line_no)?;
        graph.ensure_participant(to, None, false, line_no)?;

        let text = caps
            .name("text")
            .map(|m| m.as_str().trim())
            .filter(|text| !text.is_empty())
            .map(str::to_owned);
        graph.messages.push(Message { from: from.to_owned(), to: to.to_owned(), arrow, text });
    }

    if !saw_header {
        return Err(NotationParseError::MissingHeader);
    }
    Ok(graph)
}

/// Parses a sequence diagram. Participants become lifelines laid out left to right; messages
/// are stacked top to bottom and carry one routing point per endpoint at the message's y.
pub(super) fn import(
    text: &str,
    codec: &NotationCodec,
) -> Result<ImportedGraph, NotationParseError> {
    let graph = parse(text)?;
    let geometry = codec.sequence_geometry();
    let origin = codec.layout_options().origin;

    let message_ys = (0..graph.messages.len())
        .map(|idx| origin.y() + geometry.top_margin + idx as f64 * geometry.message_spacing)
        .collect::<Vec<_>>();
    let height = geometry.lifeline_height(origin.y(), message_ys.last().copied());

    let mut centers = BTreeMap::<&str, f64>::new();
    let shapes = graph
        .participants
        .iter()
        .enumerate()
        .map(|(idx, participant)| {
            let x = origin.x() + idx as f64 * geometry.lifeline_spacing;
            let bounds = Bounds::new(x, origin.y(), geometry.lifeline_width, height);
            centers.insert(participant.ident.as_str(), bounds.center_x());

            let mut data = json!({ "label": participant.label });
            if participant.actor {
                data["role"] = json!("actor");
            }
            Shape::new(participant_id(&participant.ident), kinds::LIFELINE, bounds).with_data(data)
        })
        .collect::<Vec<_>>();

    let connectors = graph
        .messages
        .iter()
        .zip(message_ys)
        .enumerate()
        .map(|(idx, (message, y))| {
            let from_x = centers.get(message.from.as_str()).copied().unwrap_or(origin.x());
            let to_x = centers.get(message.to.as_str()).copied().unwrap_or(origin.x());
            let connector = Connector::new(
                message_id_from_index(idx + 1),
                participant_id(&message.from),
                participant_id(&message.to),
            )
            .with_markers(EndMarker::None, message.arrow.end_marker())
            .with_line_style(message.arrow.line_style())
            .with_points([Point::new(from_x, y), Point::new(to_x, y)]);
            match &message.text {
                Some(text) => connector.with_label(text.clone()),
                None => connector,
            }
        })
        .collect::<Vec<_>>();

    debug!(lifelines = shapes.len(), messages = connectors.len(); "imported sequence notation");
    Ok(ImportedGraph::new(DiagramKind::Sequence, shapes, connectors))
}

fn valid_text(text: &str) -> bool {
    !text.contains('\n') && !text.contains('\r')
}

/// Exports lifelines as participants (ordered by x) and the messages between them (ordered by
/// y). Shapes that are not lifelines and connectors that do not join two lifelines are skipped.
pub(super) fn export(
    _codec: &NotationCodec,
    shapes: &[&Shape],
    connectors: &[&Connector],
) -> Result<ExportedNotation, NotationExportError> {
    let mut lifelines = shapes.iter().filter(|s| s.kind() == kinds::LIFELINE).collect::<Vec<_>>();
    lifelines.sort_by(|a, b| {
        a.bounds().x().total_cmp(&b.bounds().x()).then_with(|| a.id().cmp(b.id()))
    });

    let mut metadata = NotationMetadata::default();
    let mut idents = BTreeMap::<&ShapeId, String>::new();
    let mut out = String::from("sequenceDiagram\n");

    for (idx, lifeline) in lifelines.iter().enumerate() {
        let ident = export_ident(lifeline.id(), idx + 1, &metadata.node_ids);
        let label = lifeline.label().unwrap_or(&ident).to_owned();
        if !valid_text(&label) || label.contains(" as ") {
            let shape_id = lifeline.id().clone();
            return Err(NotationExportError::InvalidLabel { shape_id, label });
        }

        let keyword = if lifeline.data()["role"] == "actor" { "actor" } else { "participant" };
        if label == ident {
            out.push_str(&format!("  {keyword} {ident}\n"));
        } else {
            out.push_str(&format!("  {keyword} {ident} as {label}\n"));
        }
        metadata.node_ids.insert(ident.clone(), lifeline.id().clone());
        idents.insert(lifeline.id(), ident);
    }

    let mut messages = connectors
        .iter()
        .filter(|c| {
            idents.contains_key(c.source_shape_id()) && idents.contains_key(c.target_shape_id())
        })
        .collect::<Vec<_>>();
    messages.sort_by(|a, b| {
        let (ya, yb) = (message_y(a).unwrap_or(f64::MAX), message_y(b).unwrap_or(f64::MAX));
        ya.total_cmp(&yb).then_with(|| a.id().cmp(b.id()))
    });

    for message in messages {
        let from = idents.get(message.source_shape_id()).cloned().unwrap_or_default();
        let to = idents.get(message.target_shape_id()).cloned().unwrap_or_default();
        let arrow = Arrow::of(message).token();
        match message.label() {
            Some(text) if !valid_text(text) => {
                return Err(NotationExportError::InvalidConnectorLabel {
                    connector_id: message.id().clone(),
                    label: text.to_owned(),
                });
            }
            Some(text) => out.push_str(&format!("  {from}{arrow}{to}: {text}\n")),
            None => out.push_str(&format!("  {from}{arrow}{to}\n")),
        }
        metadata.connector_ids.push(message.id().clone());
    }

    Ok(ExportedNotation { kind: DiagramKind::Sequence, syntax: out, metadata })
}
