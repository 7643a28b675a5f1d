// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::model::{Connector, ConnectorId, Diagram, Shape, ShapeId};

/// Transient per-view state mirrored from the store (e.g. what a renderer draws).
///
/// Commands only write to it through [`CacheStage::commit`], after the persisted write resolved.
pub trait LocalCache: Send + Sync {
    fn upsert_shape(&self, shape: &Shape);
    fn remove_shape(&self, shape_id: &ShapeId);
    fn upsert_connector(&self, connector: &Connector);
    fn remove_connector(&self, connector_id: &ConnectorId);
}

/// Pending local-cache changes for one persisted write.
///
/// Staged entries carry ids only; on commit the entity state is copied from the diagram the
/// store returned, so the cache can only ever reflect persisted truth. Dropping an uncommitted
/// stage discards it.
#[derive(Debug, Default)]
#[must_use]
pub struct CacheStage {
    refresh_shapes: Vec<ShapeId>,
    refresh_connectors: Vec<ConnectorId>,
    removed_shapes: Vec<ShapeId>,
    removed_connectors: Vec<ConnectorId>,
}

impl CacheStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_shape(&mut self, shape_id: ShapeId) {
        self.refresh_shapes.push(shape_id);
    }

    pub fn refresh_shapes(&mut self, shape_ids: impl IntoIterator<Item = ShapeId>) {
        self.refresh_shapes.extend(shape_ids);
    }

    pub fn refresh_connectors(&mut self, connector_ids: impl IntoIterator<Item = ConnectorId>) {
        self.refresh_connectors.extend(connector_ids);
    }

    pub fn remove_shapes(&mut self, shape_ids: impl IntoIterator<Item = ShapeId>) {
        self.removed_shapes.extend(shape_ids);
    }

    pub fn remove_connectors(&mut self, connector_ids: impl IntoIterator<Item = ConnectorId>) {
        self.removed_connectors.extend(connector_ids);
    }

    pub fn is_empty(&self) -> bool {
        self.refresh_shapes.is_empty()
            && self.refresh_connectors.is_empty()
            && self.removed_shapes.is_empty()
            && self.removed_connectors.is_empty()
    }

    pub fn commit(self, persisted: &Diagram, cache: Option<&dyn LocalCache>) {
        let Some(cache) = cache else {
            return;
        };

        for connector_id in &self.removed_connectors {
            cache.remove_connector(connector_id);
        }
        for shape_id in &self.removed_shapes {
            cache.remove_shape(shape_id);
        }
        for shape_id in &self.refresh_shapes {
            match persisted.shape(shape_id) {
                Some(shape) => cache.upsert_shape(shape),
                None => cache.remove_shape(shape_id),
            }
        }
        for connector_id in &self.refresh_connectors {
            match persisted.connector(connector_id) {
                Some(connector) => cache.upsert_connector(connector),
                None => cache.remove_connector(connector_id),
            }
        }
        trace!(
            diagram_id:% = persisted.id(),
            rev = persisted.rev(),
            shapes = self.refresh_shapes.len() + self.removed_shapes.len(),
            connectors = self.refresh_connectors.len() + self.removed_connectors.len();
            "committed cache stage"
        );
    }
}

#[derive(Debug, Default)]
struct RenderState {
    shapes: BTreeMap<ShapeId, Shape>,
    connectors: BTreeMap<ConnectorId, Connector>,
    writes: usize,
}

/// Simple in-memory [`LocalCache`] holding one diagram's entities.
#[derive(Debug, Default)]
pub struct RenderCache {
    state: Mutex<RenderState>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(diagram: &Diagram) -> Self {
        let cache = Self::new();
        {
            let mut state = cache.lock();
            state.shapes = diagram.shapes().clone();
            state.connectors = diagram.connectors().clone();
        }
        cache
    }

    fn lock(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shape(&self, shape_id: &ShapeId) -> Option<Shape> {
        self.lock().shapes.get(shape_id).cloned()
    }

    pub fn connector(&self, connector_id: &ConnectorId) -> Option<Connector> {
        self.lock().connectors.get(connector_id).cloned()
    }

    /// Number of individual cache writes applied so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// True when the cache holds exactly the entities of `diagram`.
    pub fn mirrors(&self, diagram: &Diagram) -> bool {
        let state = self.lock();
        &state.shapes == diagram.shapes() && &state.connectors == diagram.connectors()
    }
}

impl LocalCache for RenderCache {
    fn upsert_shape(&self, shape: &Shape) {
        let mut state = self.lock();
        state.shapes.insert(shape.id().clone(), shape.clone());
        state.writes += 1;
    }

    fn remove_shape(&self, shape_id: &ShapeId) {
        let mut state = self.lock();
        state.shapes.remove(shape_id);
        state.writes += 1;
    }

    fn upsert_connector(&self, connector: &Connector) {
        let mut state = self.lock();
        state.connectors.insert(connector.id().clone(), connector.clone());
        state.writes += 1;
    }

    fn remove_connector(&self, connector_id: &ConnectorId) {
        let mut state = self.lock();
        state.connectors.remove(connector_id);
        state.writes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheStage, LocalCache, RenderCache};
    use crate::model::fixtures::{nested_groups, sid};
    use crate::model::Point;

    #[test]
    fn commit_copies_persisted_state_into_the_cache() {
        let diagram = nested_groups();
        let cache = RenderCache::new();

        let mut stage = CacheStage::new();
        stage.refresh_shapes([sid("child1"), sid("gone")]);
        stage.commit(&diagram, Some(&cache as &dyn LocalCache));

        assert_eq!(cache.shape(&sid("child1")), diagram.shape(&sid("child1")).cloned());
        assert_eq!(cache.shape(&sid("gone")), None);
    }

    #[test]
    fn dropped_stage_leaves_the_cache_untouched() {
        let diagram = nested_groups();
        let cache = RenderCache::seeded(&diagram);

        let mut stage = CacheStage::new();
        stage.remove_shapes([sid("loose")]);
        drop(stage);

        assert!(cache.mirrors(&diagram));
        assert_eq!(cache.writes(), 0);
    }

    #[test]
    fn commit_without_cache_is_a_no_op() {
        let mut moved = nested_groups();
        if let Some(shape) = moved.shape_mut(&sid("loose")) {
            shape.set_position(Point::new(1.0, 1.0));
        }
        let mut stage = CacheStage::new();
        stage.refresh_shape(sid("loose"));
        assert!(!stage.is_empty());
        stage.commit(&moved, None);
    }
}
