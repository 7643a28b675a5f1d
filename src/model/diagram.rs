// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::connector::Connector;
use super::containment::ContainmentIndex;
use super::geometry::Bounds;
use super::ids::{ConnectorId, DiagramId, ShapeId};
use super::shape::Shape;

/// The type of diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagramKind {
    Flowchart,
    Sequence,
    /// Group/service-style diagrams (containers holding services).
    Architecture,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("connector {connector_id} references missing shape {shape_id}")]
    DanglingConnector { connector_id: ConnectorId, shape_id: ShapeId },
    #[error("shape {shape_id} references missing parent {parent_id}")]
    UnknownParent { shape_id: ShapeId, parent_id: ShapeId },
    #[error("shape {shape_id} is its own ancestor")]
    ContainmentCycle { shape_id: ShapeId },
}

/// Entity ids belonging to one preview group, in id order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreviewGroup {
    pub shapes: Vec<ShapeId>,
    pub connectors: Vec<ConnectorId>,
}

impl PreviewGroup {
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.connectors.is_empty()
    }
}

/// One diagram: a shape collection plus a connector collection.
///
/// Mutation is crate-private: outside code changes a diagram only by running commands against a
/// [`GraphStore`](crate::store::GraphStore), which is the single source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    id: DiagramId,
    kind: DiagramKind,
    #[serde(default)]
    rev: u64,
    #[serde(default)]
    shapes: BTreeMap<ShapeId, Shape>,
    #[serde(default)]
    connectors: BTreeMap<ConnectorId, Connector>,
}

impl Diagram {
    pub fn new(id: DiagramId, kind: DiagramKind) -> Self {
        Self { id, kind, rev: 0, shapes: BTreeMap::new(), connectors: BTreeMap::new() }
    }

    /// Builds a diagram from a full entity set and checks the structural invariants.
    pub fn with_entities(
        id: DiagramId,
        kind: DiagramKind,
        shapes: impl IntoIterator<Item = Shape>,
        connectors: impl IntoIterator<Item = Connector>,
    ) -> Result<Self, InvariantViolation> {
        let mut diagram = Self::new(id, kind);
        for shape in shapes {
            diagram.shapes.insert(shape.id().clone(), shape);
        }
        for connector in connectors {
            diagram.connectors.insert(connector.id().clone(), connector);
        }
        diagram.check_invariants()?;
        Ok(diagram)
    }

    pub fn id(&self) -> &DiagramId {
        &self.id
    }

    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    pub fn rev(&self) -> u64 {
        self.rev
    }

    pub fn shapes(&self) -> &BTreeMap<ShapeId, Shape> {
        &self.shapes
    }

    pub fn connectors(&self) -> &BTreeMap<ConnectorId, Connector> {
        &self.connectors
    }

    pub fn shape(&self, shape_id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(shape_id)
    }

    pub fn connector(&self, connector_id: &ConnectorId) -> Option<&Connector> {
        self.connectors.get(connector_id)
    }

    /// Derived parent → children index (parent pointers are the only stored relation).
    pub fn containment(&self) -> ContainmentIndex {
        ContainmentIndex::build(self.shapes.values())
    }

    pub fn descendants_of(&self, shape_id: &ShapeId) -> Vec<ShapeId> {
        self.containment().descendants_of(shape_id)
    }

    pub fn outgoing_connectors(&self, shape_id: &ShapeId) -> Vec<&Connector> {
        self.connectors.values().filter(|c| c.source_shape_id() == shape_id).collect()
    }

    pub fn connectors_touching(&self, shape_id: &ShapeId) -> Vec<&Connector> {
        self.connectors.values().filter(|c| c.touches(shape_id)).collect()
    }

    /// Uncommitted entities tagged with `tag`.
    pub fn preview_group(&self, tag: &str) -> PreviewGroup {
        PreviewGroup {
            shapes: self
                .shapes
                .values()
                .filter(|s| s.is_preview() && s.overlay_tag() == Some(tag))
                .map(|s| s.id().clone())
                .collect(),
            connectors: self
                .connectors
                .values()
                .filter(|c| c.is_preview() && c.overlay_tag() == Some(tag))
                .map(|c| c.id().clone())
                .collect(),
        }
    }

    /// True when committed (non-preview) entities carry `tag`.
    pub fn has_committed_tag(&self, tag: &str) -> bool {
        self.shapes.values().any(|s| !s.is_preview() && s.overlay_tag() == Some(tag))
            || self.connectors.values().any(|c| !c.is_preview() && c.overlay_tag() == Some(tag))
    }

    /// Bounding box of a set of shapes; `None` when none of the ids resolve.
    pub fn bounds_of<'a>(
        &self,
        shape_ids: impl IntoIterator<Item = &'a ShapeId>,
    ) -> Option<Bounds> {
        shape_ids
            .into_iter()
            .filter_map(|id| self.shapes.get(id))
            .map(Shape::bounds)
            .reduce(Bounds::union)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for connector in self.connectors.values() {
            for endpoint in [connector.source_shape_id(), connector.target_shape_id()] {
                if !self.shapes.contains_key(endpoint) {
                    return Err(InvariantViolation::DanglingConnector {
                        connector_id: connector.id().clone(),
                        shape_id: endpoint.clone(),
                    });
                }
            }
        }

        for shape in self.shapes.values() {
            let Some(parent_id) = shape.parent_id() else {
                continue;
            };
            if !self.shapes.contains_key(parent_id) {
                return Err(InvariantViolation::UnknownParent {
                    shape_id: shape.id().clone(),
                    parent_id: parent_id.clone(),
                });
            }

            let mut seen = BTreeSet::new();
            let mut cursor = Some(parent_id);
            while let Some(current) = cursor {
                if current == shape.id() || !seen.insert(current) {
                    return Err(InvariantViolation::ContainmentCycle {
                        shape_id: shape.id().clone(),
                    });
                }
                cursor = self.shapes.get(current).and_then(Shape::parent_id);
            }
        }

        Ok(())
    }

    pub(crate) fn shape_mut(&mut self, shape_id: &ShapeId) -> Option<&mut Shape> {
        self.shapes.get_mut(shape_id)
    }

    pub(crate) fn connector_mut(&mut self, connector_id: &ConnectorId) -> Option<&mut Connector> {
        self.connectors.get_mut(connector_id)
    }

    pub(crate) fn insert_shape(&mut self, shape: Shape) -> Option<Shape> {
        self.shapes.insert(shape.id().clone(), shape)
    }

    pub(crate) fn insert_connector(&mut self, connector: Connector) -> Option<Connector> {
        self.connectors.insert(connector.id().clone(), connector)
    }

    pub(crate) fn remove_shape(&mut self, shape_id: &ShapeId) -> Option<Shape> {
        self.shapes.remove(shape_id)
    }

    pub(crate) fn remove_connector(&mut self, connector_id: &ConnectorId) -> Option<Connector> {
        self.connectors.remove(connector_id)
    }

    pub(crate) fn bump_rev(&mut self) {
        self.rev = self.rev.saturating_add(1);
    }
}
