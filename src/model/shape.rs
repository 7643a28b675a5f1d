// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use super::geometry::{Bounds, Point, Size};
use super::ids::ShapeId;

/// Marks every entity that belongs to one preview group (the id of the generator shape that
/// produced it).
pub type OverlayTag = SmolStr;

/// Type tags the engine itself interprets. Any other tag is carried through untouched.
pub mod kinds {
    pub const GENERATOR: &str = "generator";
    pub const SUGGESTION: &str = "suggestion";
    pub const GROUP: &str = "group";
    pub const RECT: &str = "rect";
    pub const ROUND: &str = "round";
    pub const DIAMOND: &str = "diamond";
    pub const LIFELINE: &str = "lifeline";
    pub const CLASS: &str = "class";
    pub const ENTITY: &str = "entity";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    id: ShapeId,
    #[serde(rename = "type")]
    kind: SmolStr,
    bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<ShapeId>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    is_preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overlay_tag: Option<OverlayTag>,
}

impl Shape {
    pub fn new(id: ShapeId, kind: impl Into<SmolStr>, bounds: Bounds) -> Self {
        Self {
            id,
            kind: kind.into(),
            bounds,
            parent_id: None,
            data: Value::Null,
            is_preview: false,
            overlay_tag: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_parent(mut self, parent_id: ShapeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn id(&self) -> &ShapeId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn position(&self) -> Point {
        self.bounds.origin()
    }

    pub fn size(&self) -> Size {
        self.bounds.size()
    }

    pub fn parent_id(&self) -> Option<&ShapeId> {
        self.parent_id.as_ref()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn overlay_tag(&self) -> Option<&str> {
        self.overlay_tag.as_deref()
    }

    /// Convenience accessor for the `label` string most shape kinds keep in `data`.
    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: ShapeId) {
        self.id = id;
    }

    pub fn set_position(&mut self, position: Point) {
        self.bounds = self.bounds.with_origin(position);
    }

    pub fn set_size(&mut self, size: Size) {
        self.bounds = self.bounds.with_size(size);
    }

    pub fn set_parent_id(&mut self, parent_id: Option<ShapeId>) {
        self.parent_id = parent_id;
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    pub fn set_preview(&mut self, is_preview: bool) {
        self.is_preview = is_preview;
    }

    pub fn set_overlay_tag<T: Into<OverlayTag>>(&mut self, tag: Option<T>) {
        self.overlay_tag = tag.map(Into::into);
    }
}
