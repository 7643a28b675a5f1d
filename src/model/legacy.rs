// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Import of diagram documents that still carry the old containment bookkeeping.
//!
//! Older documents record containment up to three times: a `children` list on the parent, a
//! `parentId` on the child, and a `previewShapeIds` list on preview containers. Loading folds all
//! of them into the child's `parentId`, which is the only relation the engine stores.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;

use super::connector::Connector;
use super::diagram::{Diagram, DiagramKind, InvariantViolation};
use super::geometry::Bounds;
use super::ids::{DiagramId, ShapeId};
use super::shape::{OverlayTag, Shape};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegacyError {
    #[error("invalid legacy document: {0}")]
    Json(String),
    #[error("shape {container_id} lists unknown child {child_id}")]
    UnknownChild { container_id: ShapeId, child_id: ShapeId },
    #[error("shape {child_id} is claimed by both {first} and {second}")]
    ConflictingParent { child_id: ShapeId, first: ShapeId, second: ShapeId },
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyShape {
    id: ShapeId,
    #[serde(rename = "type")]
    kind: SmolStr,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    parent_id: Option<ShapeId>,
    #[serde(default)]
    children: Vec<ShapeId>,
    #[serde(default)]
    preview_shape_ids: Vec<ShapeId>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    is_preview: bool,
    #[serde(default)]
    overlay_tag: Option<OverlayTag>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDocument {
    id: DiagramId,
    #[serde(rename = "type")]
    kind: DiagramKind,
    #[serde(default)]
    shapes: Vec<LegacyShape>,
    #[serde(default)]
    connectors: Vec<Connector>,
}

pub fn diagram_from_legacy_json(input: &str) -> Result<Diagram, LegacyError> {
    let document: LegacyDocument =
        serde_json::from_str(input).map_err(|err| LegacyError::Json(err.to_string()))?;
    normalize(document)
}

fn normalize(document: LegacyDocument) -> Result<Diagram, LegacyError> {
    let mut parents = BTreeMap::<ShapeId, ShapeId>::new();

    for shape in &document.shapes {
        if let Some(parent_id) = &shape.parent_id {
            claim(&mut parents, shape.id.clone(), parent_id.clone())?;
        }
    }

    for container in &document.shapes {
        for child_id in container.children.iter().chain(&container.preview_shape_ids) {
            if !document.shapes.iter().any(|s| &s.id == child_id) {
                return Err(LegacyError::UnknownChild {
                    container_id: container.id.clone(),
                    child_id: child_id.clone(),
                });
            }
            claim(&mut parents, child_id.clone(), container.id.clone())?;
        }
    }

    let shapes = document.shapes.into_iter().map(|legacy| {
        let bounds = Bounds::new(legacy.x, legacy.y, legacy.width, legacy.height);
        let mut shape = Shape::new(legacy.id, legacy.kind, bounds).with_data(legacy.data);
        shape.set_parent_id(parents.get(shape.id()).cloned());
        shape.set_preview(legacy.is_preview);
        shape.set_overlay_tag(legacy.overlay_tag);
        shape
    });

    Ok(Diagram::with_entities(document.id, document.kind, shapes, document.connectors)?)
}

fn claim(
    parents: &mut BTreeMap<ShapeId, ShapeId>,
    child_id: ShapeId,
    parent_id: ShapeId,
) -> Result<(), LegacyError> {
    match parents.get(&child_id) {
        Some(existing) if existing != &parent_id => Err(LegacyError::ConflictingParent {
            child_id,
            first: existing.clone(),
            second: parent_id,
        }),
        Some(_) => Ok(()),
        None => {
            parents.insert(child_id, parent_id);
            Ok(())
        }
    }
}
