// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeSet;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use super::{Command, CommandContext, CommandError};
use crate::format::notation::SequenceGeometry;
use crate::layout::{compute_activations, message_y, ActivationBox};
use crate::model::{kinds, Connector, Diagram, Shape, ShapeId, Size};
use crate::store::{CacheStage, ShapePatch, ShapeUpdate};

/// Key under which a lifeline's activation boxes are stored in its `data`.
pub const ACTIVATIONS_KEY: &str = "activations";

/// Derived state of one lifeline: its normalized size and its data with fresh activation boxes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DerivedLifeline {
    pub shape_id: ShapeId,
    pub size: Size,
    pub data: Value,
}

fn activations_value(boxes: &[ActivationBox]) -> Value {
    Value::Array(
        boxes
            .iter()
            .map(|b| json!({ "startY": b.start_y(), "endY": b.end_y(), "depth": b.depth() }))
            .collect(),
    )
}

fn with_activations(data: &Value, boxes: &[ActivationBox]) -> Value {
    let mut data = match data {
        Value::Object(_) => data.clone(),
        _ => json!({}),
    };
    data[ACTIVATIONS_KEY] = activations_value(boxes);
    data
}

/// Recomputes lifeline-derived state over the given view of a sequence diagram.
///
/// With `geometry`, every lifeline is first stretched (or shrunk) to one common height that fits
/// the lowest message; without it, heights are kept. Activation boxes are computed afterwards,
/// so boxes left open end at the normalized bottom.
pub(crate) fn derive_lifelines(
    shapes: &[&Shape],
    connectors: &[&Connector],
    geometry: Option<&SequenceGeometry>,
) -> Vec<DerivedLifeline> {
    let lifelines =
        shapes.iter().copied().filter(|s| s.kind() == kinds::LIFELINE).collect::<Vec<_>>();
    let lifeline_ids = lifelines.iter().map(|s| s.id()).collect::<BTreeSet<_>>();

    let resized = match geometry {
        Some(geometry) => {
            let last_y = connectors
                .iter()
                .filter(|c| {
                    lifeline_ids.contains(c.source_shape_id())
                        && lifeline_ids.contains(c.target_shape_id())
                })
                .filter_map(|c| message_y(c))
                .max_by(f64::total_cmp);
            let height = lifelines
                .iter()
                .map(|s| geometry.lifeline_height(s.position().y(), last_y))
                .max_by(f64::total_cmp)
                .unwrap_or(geometry.min_height);
            lifelines
                .iter()
                .map(|s| {
                    let mut shape = (**s).clone();
                    shape.set_size(s.size().with_height(height));
                    shape
                })
                .collect::<Vec<_>>()
        }
        None => lifelines.iter().map(|s| (**s).clone()).collect(),
    };

    let activations = compute_activations(resized.iter(), connectors.iter().copied());
    resized
        .into_iter()
        .map(|shape| {
            let boxes = activations.get(shape.id()).map(Vec::as_slice).unwrap_or_default();
            DerivedLifeline {
                data: with_activations(shape.data(), boxes),
                size: shape.size(),
                shape_id: shape.id().clone(),
            }
        })
        .collect()
}

/// Committed (non-preview) entities, plus the preview entities tagged `extra_tag` when given.
pub(crate) fn committed_view<'a>(
    diagram: &'a Diagram,
    extra_tag: Option<&str>,
) -> (Vec<&'a Shape>, Vec<&'a Connector>) {
    let included = |is_preview: bool, tag: Option<&str>| {
        !is_preview || (extra_tag.is_some() && tag == extra_tag)
    };
    let shapes = diagram
        .shapes()
        .values()
        .filter(|s| included(s.is_preview(), s.overlay_tag()))
        .collect();
    let connectors = diagram
        .connectors()
        .values()
        .filter(|c| included(c.is_preview(), c.overlay_tag()))
        .collect();
    (shapes, connectors)
}

/// Recomputes the activation boxes stored on every committed lifeline.
#[derive(Debug)]
pub struct RefreshActivationsCommand {
    ctx: CommandContext,
    previous: Option<Vec<(ShapeId, Value)>>,
}

impl RefreshActivationsCommand {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx, previous: None }
    }

    /// Number of lifelines whose stored activations changed on the last execute.
    pub fn changed(&self) -> usize {
        self.previous.as_ref().map_or(0, Vec::len)
    }
}

#[async_trait]
impl Command for RefreshActivationsCommand {
    fn description(&self) -> String {
        "Refresh activations".to_owned()
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let (shapes, connectors) = committed_view(&diagram, None);

        let mut previous = Vec::new();
        let mut updates = Vec::new();
        for derived in derive_lifelines(&shapes, &connectors, None) {
            let Some(current) = diagram.shape(&derived.shape_id) else {
                continue;
            };
            if current.data() == &derived.data {
                continue;
            }
            previous.push((derived.shape_id.clone(), current.data().clone()));
            updates.push(ShapeUpdate::new(
                derived.shape_id,
                ShapePatch { data: Some(derived.data), ..ShapePatch::default() },
            ));
        }

        if !updates.is_empty() {
            let mut stage = CacheStage::new();
            stage.refresh_shapes(previous.iter().map(|(id, _)| id.clone()));
            let persisted =
                self.ctx.store().update_entities(self.ctx.diagram_id(), updates, Vec::new()).await?;
            self.ctx.commit(stage, &persisted);
        }

        debug!(
            diagram_id:% = self.ctx.diagram_id(),
            changed = previous.len();
            "refreshed activations"
        );
        self.previous = Some(previous);
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let previous = self.previous.as_ref().ok_or(CommandError::NotExecuted)?;
        if previous.is_empty() {
            return Ok(());
        }

        let updates = previous
            .iter()
            .map(|(shape_id, data)| {
                ShapeUpdate::new(
                    shape_id.clone(),
                    ShapePatch { data: Some(data.clone()), ..ShapePatch::default() },
                )
            })
            .collect();
        let mut stage = CacheStage::new();
        stage.refresh_shapes(previous.iter().map(|(id, _)| id.clone()));
        let persisted =
            self.ctx.store().update_entities(self.ctx.diagram_id(), updates, Vec::new()).await?;
        self.ctx.commit(stage, &persisted);
        Ok(())
    }
}
