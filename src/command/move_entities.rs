// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeSet;

use async_trait::async_trait;
use log::{debug, warn};

use super::{Command, CommandContext, CommandError};
use crate::config::MissingShapePolicy;
use crate::model::{Diagram, Point, ShapeId};
use crate::store::{CacheStage, ShapePatch, ShapeUpdate};

/// One shape moving from `from` to `to`.
///
/// `from` is taken as given: it must match the shape's position when the move executes.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMove {
    pub shape_id: ShapeId,
    pub from: Point,
    pub to: Point,
}

impl EntityMove {
    pub fn new(shape_id: ShapeId, from: Point, to: Point) -> Self {
        Self { shape_id, from, to }
    }

    pub fn delta(&self) -> (f64, f64) {
        self.from.delta_to(self.to)
    }
}

/// Expands explicit moves with every descendant of each moved shape, shifted by the same delta.
///
/// Explicitly listed shapes are never cascaded into, so a child moved on its own keeps its own
/// target even when its parent moves too. Each shape appears at most once in the result.
pub fn resolve_moves(
    diagram: &Diagram,
    moves: &[EntityMove],
    policy: MissingShapePolicy,
) -> Result<Vec<EntityMove>, CommandError> {
    let mut seen = moves.iter().map(|m| m.shape_id.clone()).collect::<BTreeSet<_>>();
    let mut applied = BTreeSet::<&ShapeId>::new();
    let containment = diagram.containment();
    let mut resolved = Vec::with_capacity(moves.len());

    for explicit in moves {
        if diagram.shape(&explicit.shape_id).is_none() {
            match policy {
                MissingShapePolicy::Skip => {
                    warn!(shape_id:% = explicit.shape_id; "skipping move of missing shape");
                    continue;
                }
                MissingShapePolicy::Strict => {
                    return Err(CommandError::ShapeNotFound {
                        shape_id: explicit.shape_id.clone(),
                    });
                }
            }
        }
        if !applied.insert(&explicit.shape_id) {
            continue;
        }
        resolved.push(explicit.clone());

        let (dx, dy) = explicit.delta();
        for descendant_id in containment.descendants_of(&explicit.shape_id) {
            if !seen.insert(descendant_id.clone()) {
                continue;
            }
            let Some(descendant) = diagram.shape(&descendant_id) else {
                continue;
            };
            let from = descendant.position();
            resolved.push(EntityMove::new(descendant_id, from, from.offset(dx, dy)));
        }
    }

    Ok(resolved)
}

/// Moves shapes together with everything they contain, in one batched store write.
#[derive(Debug)]
pub struct MoveEntitiesCommand {
    ctx: CommandContext,
    moves: Vec<EntityMove>,
    policy: MissingShapePolicy,
    resolved: Option<Vec<EntityMove>>,
}

impl MoveEntitiesCommand {
    pub fn new(ctx: CommandContext, moves: Vec<EntityMove>) -> Result<Self, CommandError> {
        if moves.is_empty() {
            return Err(CommandError::Validation("move requires at least one shape".to_owned()));
        }
        let policy = ctx.missing_shapes();
        Ok(Self { ctx, moves, policy, resolved: None })
    }

    /// Overrides the policy inherited from the context.
    pub fn with_policy(mut self, policy: MissingShapePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Explicit plus cascaded moves captured by the last execute.
    pub fn resolved_moves(&self) -> Option<&[EntityMove]> {
        self.resolved.as_deref()
    }

    async fn write(&self, targets: Vec<(ShapeId, Point)>) -> Result<(), CommandError> {
        if targets.is_empty() {
            return Ok(());
        }

        let mut stage = CacheStage::new();
        stage.refresh_shapes(targets.iter().map(|(shape_id, _)| shape_id.clone()));
        let updates = targets
            .into_iter()
            .map(|(shape_id, position)| ShapeUpdate::new(shape_id, ShapePatch::position(position)))
            .collect::<Vec<_>>();

        let persisted =
            self.ctx.store().update_entities(self.ctx.diagram_id(), updates, Vec::new()).await?;
        self.ctx.commit(stage, &persisted);
        Ok(())
    }
}

#[async_trait]
impl Command for MoveEntitiesCommand {
    fn description(&self) -> String {
        match self.moves.as_slice() {
            [single] => format!("Move {}", single.shape_id),
            moves => format!("Move {} shapes", moves.len()),
        }
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let resolved = resolve_moves(&diagram, &self.moves, self.policy)?;

        self.write(resolved.iter().map(|m| (m.shape_id.clone(), m.to)).collect()).await?;
        debug!(
            diagram_id:% = self.ctx.diagram_id(),
            explicit = self.moves.len(),
            total = resolved.len();
            "moved shapes"
        );
        self.resolved = Some(resolved);
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let resolved = self.resolved.as_ref().ok_or(CommandError::NotExecuted)?;
        self.write(resolved.iter().rev().map(|m| (m.shape_id.clone(), m.from)).collect()).await?;
        debug!(diagram_id:% = self.ctx.diagram_id(), total = resolved.len(); "undid move");
        Ok(())
    }
}
