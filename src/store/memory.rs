// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::trace;

use super::{ConnectorUpdate, GraphStore, ShapeUpdate, StoreError};
use crate::model::{Connector, ConnectorId, Diagram, DiagramId, Shape, ShapeId};

/// One successful write, as recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Add { diagram_id: DiagramId, shapes: Vec<ShapeId>, connectors: Vec<ConnectorId> },
    Delete { diagram_id: DiagramId, shapes: Vec<ShapeId>, connectors: Vec<ConnectorId> },
    Update { diagram_id: DiagramId, shapes: Vec<ShapeId>, connectors: Vec<ConnectorId> },
}

#[derive(Debug, Default)]
struct Faults {
    writes: usize,
    fail_at: BTreeSet<usize>,
}

/// In-process [`GraphStore`].
///
/// Every write works on a copy of the diagram and swaps it in only after the whole batch applied
/// and the diagram invariants still hold. Successful writes are recorded in a call log, and
/// individual writes can be made to fail to exercise partial-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    diagrams: Mutex<BTreeMap<DiagramId, Diagram>>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<Faults>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagram(diagram: Diagram) -> Self {
        let store = Self::new();
        store.insert_diagram(diagram);
        store
    }

    pub fn insert_diagram(&self, diagram: Diagram) {
        lock(&self.diagrams).insert(diagram.id().clone(), diagram);
    }

    pub fn snapshot(&self, diagram_id: &DiagramId) -> Option<Diagram> {
        lock(&self.diagrams).get(diagram_id).cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Makes the `nth` write from now (1-based) fail with [`StoreError::Unavailable`].
    pub fn fail_write(&self, nth: usize) {
        let mut faults = lock(&self.faults);
        let at = faults.writes + nth.max(1);
        faults.fail_at.insert(at);
    }

    fn write(
        &self,
        diagram_id: &DiagramId,
        call: StoreCall,
        apply: impl FnOnce(&mut Diagram) -> Result<(), StoreError>,
    ) -> Result<Diagram, StoreError> {
        {
            let mut faults = lock(&self.faults);
            faults.writes += 1;
            let ordinal = faults.writes;
            if faults.fail_at.remove(&ordinal) {
                return Err(StoreError::Unavailable {
                    reason: format!("injected failure on write #{ordinal}"),
                });
            }
        }

        let mut diagrams = lock(&self.diagrams);
        let current = diagrams
            .get(diagram_id)
            .ok_or_else(|| StoreError::DiagramNotFound { diagram_id: diagram_id.clone() })?;

        let mut next = current.clone();
        apply(&mut next)?;
        next.check_invariants()?;
        next.bump_rev();

        trace!(diagram_id:% = diagram_id, rev = next.rev(); "memory store write committed");
        diagrams.insert(diagram_id.clone(), next.clone());
        lock(&self.calls).push(call);
        Ok(next)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn diagram(&self, diagram_id: &DiagramId) -> Result<Diagram, StoreError> {
        self.snapshot(diagram_id)
            .ok_or_else(|| StoreError::DiagramNotFound { diagram_id: diagram_id.clone() })
    }

    async fn add_entities(
        &self,
        diagram_id: &DiagramId,
        shapes: Vec<Shape>,
        connectors: Vec<Connector>,
    ) -> Result<Diagram, StoreError> {
        let call = StoreCall::Add {
            diagram_id: diagram_id.clone(),
            shapes: shapes.iter().map(|s| s.id().clone()).collect(),
            connectors: connectors.iter().map(|c| c.id().clone()).collect(),
        };

        self.write(diagram_id, call, |diagram| {
            for shape in shapes {
                if diagram.shape(shape.id()).is_some() {
                    return Err(StoreError::ShapeExists { shape_id: shape.id().clone() });
                }
                diagram.insert_shape(shape);
            }
            for connector in connectors {
                if diagram.connector(connector.id()).is_some() {
                    return Err(StoreError::ConnectorExists {
                        connector_id: connector.id().clone(),
                    });
                }
                diagram.insert_connector(connector);
            }
            Ok(())
        })
    }

    async fn delete_entities(
        &self,
        diagram_id: &DiagramId,
        shape_ids: Vec<ShapeId>,
        connector_ids: Vec<ConnectorId>,
    ) -> Result<Diagram, StoreError> {
        let call = StoreCall::Delete {
            diagram_id: diagram_id.clone(),
            shapes: shape_ids.clone(),
            connectors: connector_ids.clone(),
        };

        self.write(diagram_id, call, |diagram| {
            for connector_id in &connector_ids {
                if diagram.remove_connector(connector_id).is_none() {
                    return Err(StoreError::ConnectorNotFound {
                        connector_id: connector_id.clone(),
                    });
                }
            }
            for shape_id in &shape_ids {
                if diagram.remove_shape(shape_id).is_none() {
                    return Err(StoreError::ShapeNotFound { shape_id: shape_id.clone() });
                }
            }
            for shape_id in &shape_ids {
                if let Some(connector) = diagram.connectors_touching(shape_id).first() {
                    return Err(StoreError::ShapeInUse {
                        shape_id: shape_id.clone(),
                        connector_id: connector.id().clone(),
                    });
                }
            }
            Ok(())
        })
    }

    async fn update_entities(
        &self,
        diagram_id: &DiagramId,
        shapes: Vec<ShapeUpdate>,
        connectors: Vec<ConnectorUpdate>,
    ) -> Result<Diagram, StoreError> {
        let call = StoreCall::Update {
            diagram_id: diagram_id.clone(),
            shapes: shapes.iter().map(|u| u.shape_id.clone()).collect(),
            connectors: connectors.iter().map(|u| u.connector_id.clone()).collect(),
        };

        self.write(diagram_id, call, |diagram| {
            for update in &shapes {
                let Some(shape) = diagram.shape_mut(&update.shape_id) else {
                    return Err(StoreError::ShapeNotFound { shape_id: update.shape_id.clone() });
                };
                update.patch.apply(shape);
            }
            for update in &connectors {
                let Some(connector) = diagram.connector_mut(&update.connector_id) else {
                    return Err(StoreError::ConnectorNotFound {
                        connector_id: update.connector_id.clone(),
                    });
                };
                update.patch.apply(connector);
            }
            Ok(())
        })
    }
}
