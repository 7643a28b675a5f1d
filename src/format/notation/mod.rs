// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Text notation codec (a Mermaid-like subset for flowcharts and sequence diagrams).
//!
//! Import and export return `Result`s instead of panicking or throwing through the command
//! layer, so callers can tell a malformed notation apart from a failed store write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::LayoutOptions;
use crate::model::{
    kinds, Connector, ConnectorId, DiagramKind, IdError, Point, Shape, ShapeId, Size,
};

mod flowchart;
mod ident;
mod sequence;

pub use ident::IdentError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationParseError {
    #[error("notation text is empty")]
    Empty,
    #[error("expected 'flowchart', 'graph' or 'sequenceDiagram' as the first non-empty line")]
    MissingHeader,
    #[error("invalid flowchart direction on line {line_no}: {direction} (expected TD/TB/LR/RL/BT)")]
    InvalidDirection { line_no: usize, direction: String },
    #[error("unsupported syntax on line {line_no}: {line}")]
    UnsupportedSyntax { line_no: usize, line: String },
    #[error("invalid identifier on line {line_no}: {name} ({reason})")]
    InvalidIdentifier { line_no: usize, name: String, reason: IdentError },
    #[error("empty label on line {line_no}: {token}")]
    EmptyLabel { line_no: usize, token: String },
    #[error("conflicting label for '{ident}' on line {line_no}: '{existing}' vs '{new}'")]
    ConflictingLabel { line_no: usize, ident: String, existing: String, new: String },
    #[error("'end' on line {line_no} does not close a subgraph")]
    UnexpectedEnd { line_no: usize },
    #[error("subgraph '{ident}' opened on line {line_no} is never closed")]
    UnclosedSubgraph { line_no: usize, ident: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationExportError {
    #[error("connector {connector_id} references shape {shape_id} outside the exported set")]
    MissingEndpoint { connector_id: ConnectorId, shape_id: ShapeId },
    #[error("cannot export label of {shape_id}: contains unsupported characters: {label:?}")]
    InvalidLabel { shape_id: ShapeId, label: String },
    #[error("cannot export label of connector {connector_id}: {label:?}")]
    InvalidConnectorLabel { connector_id: ConnectorId, label: String },
}

/// Geometry used when importing sequence diagrams and when normalizing lifeline heights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceGeometry {
    pub lifeline_spacing: f64,
    pub lifeline_width: f64,
    pub top_margin: f64,
    pub message_spacing: f64,
    pub bottom_margin: f64,
    pub min_height: f64,
}

impl Default for SequenceGeometry {
    fn default() -> Self {
        Self {
            lifeline_spacing: 200.0,
            lifeline_width: 120.0,
            top_margin: 60.0,
            message_spacing: 50.0,
            bottom_margin: 40.0,
            min_height: 200.0,
        }
    }
}

impl SequenceGeometry {
    /// Lifeline height needed so that a message at `last_message_y` fits above the bottom margin.
    pub fn lifeline_height(&self, top: f64, last_message_y: Option<f64>) -> f64 {
        let needed = last_message_y.map(|y| y - top + self.bottom_margin).unwrap_or(0.0);
        needed.max(self.min_height)
    }
}

/// Shapes and connectors produced by an import, with ids local to the import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedGraph {
    kind: DiagramKind,
    shapes: Vec<Shape>,
    connectors: Vec<Connector>,
}

impl ImportedGraph {
    pub(crate) fn new(kind: DiagramKind, shapes: Vec<Shape>, connectors: Vec<Connector>) -> Self {
        Self { kind, shapes, connectors }
    }

    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// Re-homes the graph as one preview group.
    ///
    /// Every id is scoped under `tag`, geometry is translated so the import's origin lands on
    /// `anchor`, and every entity is flagged as preview and tagged.
    pub fn into_preview(
        self,
        tag: &str,
        anchor: Point,
    ) -> Result<(Vec<Shape>, Vec<Connector>), IdError> {
        let scope_shape = |id: &ShapeId| ShapeId::scoped(tag, id.as_str());

        let shapes = self
            .shapes
            .into_iter()
            .map(|mut shape| {
                shape.set_id(scope_shape(shape.id())?);
                let parent_id = shape.parent_id().map(scope_shape).transpose()?;
                shape.set_parent_id(parent_id);
                shape.set_position(shape.position().offset(anchor.x(), anchor.y()));
                shape.set_preview(true);
                shape.set_overlay_tag(Some(tag));
                Ok(shape)
            })
            .collect::<Result<Vec<_>, IdError>>()?;

        let connectors = self
            .connectors
            .into_iter()
            .map(|mut connector| {
                connector.set_id(ConnectorId::scoped(tag, connector.id().as_str())?);
                let source = scope_shape(connector.source_shape_id())?;
                let target = scope_shape(connector.target_shape_id())?;
                connector.set_endpoints(source, target);
                let points = connector
                    .points()
                    .iter()
                    .map(|p| p.offset(anchor.x(), anchor.y()))
                    .collect::<Vec<_>>();
                connector.set_points(points);
                connector.set_preview(true);
                connector.set_overlay_tag(Some(tag));
                Ok(connector)
            })
            .collect::<Result<Vec<_>, IdError>>()?;

        Ok((shapes, connectors))
    }
}

/// Mapping from notation identifiers back to entity ids, in export order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotationMetadata {
    pub node_ids: BTreeMap<String, ShapeId>,
    pub connector_ids: Vec<ConnectorId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNotation {
    pub kind: DiagramKind,
    pub syntax: String,
    pub metadata: NotationMetadata,
}

/// Size given to every imported flowchart node.
pub const DEFAULT_NODE_SIZE: Size = Size::new(160.0, 60.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotationCodec {
    layout: LayoutOptions,
    node_size: Size,
    sequence: SequenceGeometry,
}

impl Default for NotationCodec {
    fn default() -> Self {
        Self::new(LayoutOptions::default(), DEFAULT_NODE_SIZE, SequenceGeometry::default())
    }
}

impl NotationCodec {
    pub fn new(layout: LayoutOptions, node_size: Size, sequence: SequenceGeometry) -> Self {
        Self { layout, node_size, sequence }
    }

    pub fn layout_options(&self) -> &LayoutOptions {
        &self.layout
    }

    pub fn node_size(&self) -> Size {
        self.node_size
    }

    pub fn sequence_geometry(&self) -> &SequenceGeometry {
        &self.sequence
    }

    pub fn import(&self, text: &str) -> Result<ImportedGraph, NotationParseError> {
        let Some(header) = text.lines().map(str::trim).find(|l| !l.is_empty() && !is_comment(l))
        else {
            return Err(NotationParseError::Empty);
        };

        match header.split_whitespace().next() {
            Some("flowchart" | "graph") => flowchart::import(text, self),
            Some("sequenceDiagram") => sequence::import(text, self),
            _ => Err(NotationParseError::MissingHeader),
        }
    }

    /// Exports a shape/connector set. Sets containing lifelines export as sequence diagrams,
    /// everything else as a flowchart (groups become subgraphs).
    pub fn export<'a>(
        &self,
        shapes: impl IntoIterator<Item = &'a Shape>,
        connectors: impl IntoIterator<Item = &'a Connector>,
    ) -> Result<ExportedNotation, NotationExportError> {
        let shapes = shapes.into_iter().collect::<Vec<_>>();
        let connectors = connectors.into_iter().collect::<Vec<_>>();

        for connector in &connectors {
            for endpoint in [connector.source_shape_id(), connector.target_shape_id()] {
                if !shapes.iter().any(|s| s.id() == endpoint) {
                    return Err(NotationExportError::MissingEndpoint {
                        connector_id: connector.id().clone(),
                        shape_id: endpoint.clone(),
                    });
                }
            }
        }

        if shapes.iter().any(|s| s.kind() == kinds::LIFELINE) {
            sequence::export(self, &shapes, &connectors)
        } else {
            flowchart::export(self, &shapes, &connectors)
        }
    }
}

pub(crate) fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("%%")
}

/// Picks a unique notation identifier for a shape: the last `:`-separated segment of its id
/// when that is a valid identifier, `n<index>` otherwise.
pub(crate) fn export_ident(
    shape_id: &ShapeId,
    index: usize,
    used: &BTreeMap<String, ShapeId>,
) -> String {
    let candidate = shape_id.as_str().rsplit(':').next().unwrap_or_default();
    if ident::is_valid_ident(candidate) && !used.contains_key(candidate) {
        return candidate.to_owned();
    }

    let mut suffix = index;
    loop {
        let fallback = format!("n{suffix}");
        if !used.contains_key(&fallback) {
            return fallback;
        }
        suffix += 1;
    }
}
