// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::geometry::Point;
use super::ids::{ConnectorId, ShapeId};
use super::shape::OverlayTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndMarker {
    #[default]
    None,
    Arrow,
    OpenArrow,
    Diamond,
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

pub type RoutingPoints = SmallVec<[Point; 4]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    id: ConnectorId,
    source_shape_id: ShapeId,
    target_shape_id: ShapeId,
    #[serde(default)]
    start_marker: EndMarker,
    #[serde(default)]
    end_marker: EndMarker,
    #[serde(default)]
    line_style: LineStyle,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    points: RoutingPoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default)]
    is_preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overlay_tag: Option<OverlayTag>,
}

impl Connector {
    /// A plain directed connector (`source --> target`).
    pub fn new(id: ConnectorId, source_shape_id: ShapeId, target_shape_id: ShapeId) -> Self {
        Self {
            id,
            source_shape_id,
            target_shape_id,
            start_marker: EndMarker::None,
            end_marker: EndMarker::Arrow,
            line_style: LineStyle::Solid,
            points: RoutingPoints::new(),
            label: None,
            is_preview: false,
            overlay_tag: None,
        }
    }

    pub fn with_markers(mut self, start: EndMarker, end: EndMarker) -> Self {
        self.start_marker = start;
        self.end_marker = end;
        self
    }

    pub fn with_line_style(mut self, line_style: LineStyle) -> Self {
        self.line_style = line_style;
        self
    }

    pub fn with_points(mut self, points: impl IntoIterator<Item = Point>) -> Self {
        self.points = points.into_iter().collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> &ConnectorId {
        &self.id
    }

    pub fn source_shape_id(&self) -> &ShapeId {
        &self.source_shape_id
    }

    pub fn target_shape_id(&self) -> &ShapeId {
        &self.target_shape_id
    }

    pub fn start_marker(&self) -> EndMarker {
        self.start_marker
    }

    pub fn end_marker(&self) -> EndMarker {
        self.end_marker
    }

    pub fn line_style(&self) -> LineStyle {
        self.line_style
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn overlay_tag(&self) -> Option<&str> {
        self.overlay_tag.as_deref()
    }

    /// Both ends carry a marker, so the edge reads in both directions.
    pub fn is_bidirectional(&self) -> bool {
        self.start_marker != EndMarker::None && self.end_marker != EndMarker::None
    }

    pub fn touches(&self, shape_id: &ShapeId) -> bool {
        &self.source_shape_id == shape_id || &self.target_shape_id == shape_id
    }

    pub fn set_id(&mut self, id: ConnectorId) {
        self.id = id;
    }

    pub fn set_endpoints(&mut self, source_shape_id: ShapeId, target_shape_id: ShapeId) {
        self.source_shape_id = source_shape_id;
        self.target_shape_id = target_shape_id;
    }

    pub fn set_points(&mut self, points: impl IntoIterator<Item = Point>) {
        self.points = points.into_iter().collect();
    }

    pub fn set_preview(&mut self, is_preview: bool) {
        self.is_preview = is_preview;
    }

    pub fn set_overlay_tag<T: Into<OverlayTag>>(&mut self, tag: Option<T>) {
        self.overlay_tag = tag.map(Into::into);
    }
}
