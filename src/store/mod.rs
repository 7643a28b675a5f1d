// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Graph store primitives consumed by commands.
//!
//! A [`GraphStore`] is the single source of truth for diagrams. Every mutating call is one
//! persisted write that either applies completely or fails; calls are not grouped into
//! transactions, so a command issuing several calls can leave partial state behind when a later
//! call fails. Local render caches are updated through [`CacheStage`] only after a write resolves.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::{
    Connector, ConnectorId, Diagram, DiagramId, InvariantViolation, Point, Shape, ShapeId, Size,
};

pub mod cache;
pub mod memory;

pub use cache::{CacheStage, LocalCache, RenderCache};
pub use memory::{MemoryStore, StoreCall};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("diagram not found (id={diagram_id})")]
    DiagramNotFound { diagram_id: DiagramId },
    #[error("shape already exists (id={shape_id})")]
    ShapeExists { shape_id: ShapeId },
    #[error("connector already exists (id={connector_id})")]
    ConnectorExists { connector_id: ConnectorId },
    #[error("shape not found (id={shape_id})")]
    ShapeNotFound { shape_id: ShapeId },
    #[error("connector not found (id={connector_id})")]
    ConnectorNotFound { connector_id: ConnectorId },
    #[error("shape {shape_id} is still referenced by connector {connector_id}")]
    ShapeInUse { shape_id: ShapeId, connector_id: ConnectorId },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Partial update of one shape. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapePatch {
    pub position: Option<Point>,
    pub size: Option<Size>,
    pub data: Option<Value>,
    pub is_preview: Option<bool>,
}

impl ShapePatch {
    pub fn position(position: Point) -> Self {
        Self { position: Some(position), ..Self::default() }
    }

    pub fn preview(is_preview: bool) -> Self {
        Self { is_preview: Some(is_preview), ..Self::default() }
    }

    pub fn apply(&self, shape: &mut Shape) {
        if let Some(position) = self.position {
            shape.set_position(position);
        }
        if let Some(size) = self.size {
            shape.set_size(size);
        }
        if let Some(data) = &self.data {
            shape.set_data(data.clone());
        }
        if let Some(is_preview) = self.is_preview {
            shape.set_preview(is_preview);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeUpdate {
    pub shape_id: ShapeId,
    pub patch: ShapePatch,
}

impl ShapeUpdate {
    pub fn new(shape_id: ShapeId, patch: ShapePatch) -> Self {
        Self { shape_id, patch }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectorPatch {
    pub is_preview: Option<bool>,
    pub points: Option<Vec<Point>>,
}

impl ConnectorPatch {
    pub fn preview(is_preview: bool) -> Self {
        Self { is_preview: Some(is_preview), ..Self::default() }
    }

    pub fn apply(&self, connector: &mut Connector) {
        if let Some(is_preview) = self.is_preview {
            connector.set_preview(is_preview);
        }
        if let Some(points) = &self.points {
            connector.set_points(points.iter().copied());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorUpdate {
    pub connector_id: ConnectorId,
    pub patch: ConnectorPatch,
}

impl ConnectorUpdate {
    pub fn new(connector_id: ConnectorId, patch: ConnectorPatch) -> Self {
        Self { connector_id, patch }
    }
}

/// Persistence primitives. Implementations fail by returning `Err`; commands never catch these.
///
/// Batched calls are the required surface; the single-entity variants delegate to them.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn diagram(&self, diagram_id: &DiagramId) -> Result<Diagram, StoreError>;

    async fn add_entities(
        &self,
        diagram_id: &DiagramId,
        shapes: Vec<Shape>,
        connectors: Vec<Connector>,
    ) -> Result<Diagram, StoreError>;

    async fn delete_entities(
        &self,
        diagram_id: &DiagramId,
        shape_ids: Vec<ShapeId>,
        connector_ids: Vec<ConnectorId>,
    ) -> Result<Diagram, StoreError>;

    async fn update_entities(
        &self,
        diagram_id: &DiagramId,
        shapes: Vec<ShapeUpdate>,
        connectors: Vec<ConnectorUpdate>,
    ) -> Result<Diagram, StoreError>;

    async fn shape(
        &self,
        diagram_id: &DiagramId,
        shape_id: &ShapeId,
    ) -> Result<Option<Shape>, StoreError> {
        Ok(self.diagram(diagram_id).await?.shape(shape_id).cloned())
    }

    async fn connector(
        &self,
        diagram_id: &DiagramId,
        connector_id: &ConnectorId,
    ) -> Result<Option<Connector>, StoreError> {
        Ok(self.diagram(diagram_id).await?.connector(connector_id).cloned())
    }

    async fn add_shape(&self, diagram_id: &DiagramId, shape: Shape) -> Result<Diagram, StoreError> {
        self.add_entities(diagram_id, vec![shape], Vec::new()).await
    }

    async fn add_connector(
        &self,
        diagram_id: &DiagramId,
        connector: Connector,
    ) -> Result<Diagram, StoreError> {
        self.add_entities(diagram_id, Vec::new(), vec![connector]).await
    }

    async fn delete_shape(
        &self,
        diagram_id: &DiagramId,
        shape_id: ShapeId,
    ) -> Result<Diagram, StoreError> {
        self.delete_entities(diagram_id, vec![shape_id], Vec::new()).await
    }

    async fn delete_connector(
        &self,
        diagram_id: &DiagramId,
        connector_id: ConnectorId,
    ) -> Result<Diagram, StoreError> {
        self.delete_entities(diagram_id, Vec::new(), vec![connector_id]).await
    }

    async fn update_shape(
        &self,
        diagram_id: &DiagramId,
        update: ShapeUpdate,
    ) -> Result<Diagram, StoreError> {
        self.update_entities(diagram_id, vec![update], Vec::new()).await
    }
}
