// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Edits of array-valued fields inside a shape's `data` (class attributes, entity fields, ...).
//!
//! Items are addressed by index, and undo addresses the same index again. An edit that shifts
//! the array between a command and its undo makes the undo hit a different item.

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use super::{Command, CommandContext, CommandError};
use crate::model::{kinds, Shape, ShapeId};
use crate::store::{CacheStage, ShapePatch, ShapeUpdate};

/// Which array a member command edits, and how the owning shape's height follows from its data.
#[derive(Debug, Clone, Copy)]
pub struct MemberArraySpec {
    pub shape_kind: &'static str,
    pub array_property: &'static str,
    /// Human-readable item name used in command descriptions.
    pub item_label: &'static str,
    pub calculate_height: fn(&Value) -> f64,
}

const CLASS_HEADER: f64 = 40.0;
const CLASS_ROW: f64 = 24.0;
const ENTITY_HEADER: f64 = 36.0;
const ENTITY_ROW: f64 = 28.0;

fn array_len(data: &Value, property: &str) -> usize {
    data[property].as_array().map_or(0, Vec::len)
}

/// Header plus one row per attribute and per method.
pub fn class_height(data: &Value) -> f64 {
    let rows = array_len(data, "attributes") + array_len(data, "methods");
    CLASS_HEADER + CLASS_ROW * rows as f64
}

pub fn entity_height(data: &Value) -> f64 {
    ENTITY_HEADER + ENTITY_ROW * array_len(data, "fields") as f64
}

impl MemberArraySpec {
    pub const CLASS_ATTRIBUTES: Self = Self {
        shape_kind: kinds::CLASS,
        array_property: "attributes",
        item_label: "attribute",
        calculate_height: class_height,
    };

    pub const CLASS_METHODS: Self = Self {
        shape_kind: kinds::CLASS,
        array_property: "methods",
        item_label: "method",
        calculate_height: class_height,
    };

    pub const ENTITY_FIELDS: Self = Self {
        shape_kind: kinds::ENTITY,
        array_property: "fields",
        item_label: "field",
        calculate_height: entity_height,
    };

    fn out_of_range(&self, shape_id: &ShapeId, index: usize, len: usize) -> CommandError {
        CommandError::IndexOutOfRange {
            shape_id: shape_id.clone(),
            property: self.array_property,
            index,
            len,
        }
    }

    /// Current shape and a copy of its array. A missing array reads as empty.
    async fn read(
        &self,
        ctx: &CommandContext,
        shape_id: &ShapeId,
    ) -> Result<(Shape, Vec<Value>), CommandError> {
        let diagram = ctx.diagram().await?;
        let shape = diagram
            .shape(shape_id)
            .cloned()
            .ok_or_else(|| CommandError::ShapeNotFound { shape_id: shape_id.clone() })?;
        if shape.kind() != self.shape_kind {
            return Err(CommandError::WrongShapeKind {
                shape_id: shape_id.clone(),
                expected: self.shape_kind.to_owned(),
                actual: shape.kind().to_owned(),
            });
        }
        let items = shape.data()[self.array_property].as_array().cloned().unwrap_or_default();
        Ok((shape, items))
    }

    /// Writes `items` back together with the recomputed height, as one update.
    async fn write(
        &self,
        ctx: &CommandContext,
        shape: &Shape,
        items: Vec<Value>,
    ) -> Result<(), CommandError> {
        let mut data = match shape.data() {
            Value::Object(_) => shape.data().clone(),
            _ => json!({}),
        };
        data[self.array_property] = Value::Array(items);
        let size = shape.size().with_height((self.calculate_height)(&data));

        let mut stage = CacheStage::new();
        stage.refresh_shape(shape.id().clone());
        let patch = ShapePatch { data: Some(data), size: Some(size), ..ShapePatch::default() };
        let update = ShapeUpdate::new(shape.id().clone(), patch);
        let persisted = ctx.store().update_shape(ctx.diagram_id(), update).await?;
        ctx.commit(stage, &persisted);
        debug!(
            shape_id:% = shape.id(),
            property = self.array_property,
            height = size.height();
            "wrote member array"
        );
        Ok(())
    }
}

/// Replaces the item at `index`.
#[derive(Debug)]
pub struct UpdateMemberCommand {
    ctx: CommandContext,
    spec: MemberArraySpec,
    shape_id: ShapeId,
    index: usize,
    value: Value,
    previous: Option<Value>,
}

impl UpdateMemberCommand {
    pub fn new(
        ctx: CommandContext,
        spec: MemberArraySpec,
        shape_id: ShapeId,
        index: usize,
        value: Value,
    ) -> Self {
        Self { ctx, spec, shape_id, index, value, previous: None }
    }
}

#[async_trait]
impl Command for UpdateMemberCommand {
    fn description(&self) -> String {
        format!("Update {} of {}", self.spec.item_label, self.shape_id)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let (shape, mut items) = self.spec.read(&self.ctx, &self.shape_id).await?;
        let len = items.len();
        let slot = items
            .get_mut(self.index)
            .ok_or_else(|| self.spec.out_of_range(&self.shape_id, self.index, len))?;
        let previous = std::mem::replace(slot, self.value.clone());

        self.spec.write(&self.ctx, &shape, items).await?;
        self.previous = Some(previous);
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let previous = self.previous.clone().ok_or(CommandError::NotExecuted)?;
        let (shape, mut items) = self.spec.read(&self.ctx, &self.shape_id).await?;
        let len = items.len();
        let slot = items
            .get_mut(self.index)
            .ok_or_else(|| self.spec.out_of_range(&self.shape_id, self.index, len))?;
        *slot = previous;
        self.spec.write(&self.ctx, &shape, items).await
    }
}

/// Inserts an item at `index`, or appends it when no index is given.
#[derive(Debug)]
pub struct AddMemberCommand {
    ctx: CommandContext,
    spec: MemberArraySpec,
    shape_id: ShapeId,
    value: Value,
    index: Option<usize>,
    inserted_at: Option<usize>,
}

impl AddMemberCommand {
    pub fn new(
        ctx: CommandContext,
        spec: MemberArraySpec,
        shape_id: ShapeId,
        value: Value,
    ) -> Self {
        Self { ctx, spec, shape_id, value, index: None, inserted_at: None }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

#[async_trait]
impl Command for AddMemberCommand {
    fn description(&self) -> String {
        format!("Add {} to {}", self.spec.item_label, self.shape_id)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let (shape, mut items) = self.spec.read(&self.ctx, &self.shape_id).await?;
        let at = self.index.unwrap_or(items.len());
        if at > items.len() {
            return Err(self.spec.out_of_range(&self.shape_id, at, items.len()));
        }
        items.insert(at, self.value.clone());

        self.spec.write(&self.ctx, &shape, items).await?;
        self.inserted_at = Some(at);
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let at = self.inserted_at.ok_or(CommandError::NotExecuted)?;
        let (shape, mut items) = self.spec.read(&self.ctx, &self.shape_id).await?;
        if at >= items.len() {
            return Err(self.spec.out_of_range(&self.shape_id, at, items.len()));
        }
        items.remove(at);
        self.spec.write(&self.ctx, &shape, items).await
    }
}

/// Removes the item at `index`; undo puts it back at the same position.
#[derive(Debug)]
pub struct DeleteMemberCommand {
    ctx: CommandContext,
    spec: MemberArraySpec,
    shape_id: ShapeId,
    index: usize,
    removed: Option<Value>,
}

impl DeleteMemberCommand {
    pub fn new(
        ctx: CommandContext,
        spec: MemberArraySpec,
        shape_id: ShapeId,
        index: usize,
    ) -> Self {
        Self { ctx, spec, shape_id, index, removed: None }
    }
}

#[async_trait]
impl Command for DeleteMemberCommand {
    fn description(&self) -> String {
        format!("Delete {} from {}", self.spec.item_label, self.shape_id)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let (shape, mut items) = self.spec.read(&self.ctx, &self.shape_id).await?;
        if self.index >= items.len() {
            return Err(self.spec.out_of_range(&self.shape_id, self.index, items.len()));
        }
        let removed = items.remove(self.index);

        self.spec.write(&self.ctx, &shape, items).await?;
        self.removed = Some(removed);
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let removed = self.removed.clone().ok_or(CommandError::NotExecuted)?;
        let (shape, mut items) = self.spec.read(&self.ctx, &self.shape_id).await?;
        if self.index > items.len() {
            return Err(self.spec.out_of_range(&self.shape_id, self.index, items.len()));
        }
        items.insert(self.index, removed);
        self.spec.write(&self.ctx, &shape, items).await
    }
}
