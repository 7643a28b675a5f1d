// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use serde_json::json;

use super::connector::{Connector, LineStyle};
use super::diagram::{Diagram, DiagramKind};
use super::geometry::{Bounds, Point};
use super::ids::{ConnectorId, DiagramId, ShapeId};
use super::shape::{kinds, Shape};

pub(crate) fn did(value: &str) -> DiagramId {
    DiagramId::new(value).expect("diagram id")
}

pub(crate) fn sid(value: &str) -> ShapeId {
    ShapeId::new(value).expect("shape id")
}

pub(crate) fn cid(value: &str) -> ConnectorId {
    ConnectorId::new(value).expect("connector id")
}

pub(crate) fn rect(id: &str, x: f64, y: f64) -> Shape {
    Shape::new(sid(id), kinds::RECT, Bounds::new(x, y, 100.0, 50.0))
        .with_data(json!({ "label": id }))
}

pub(crate) fn edge(id: &str, from: &str, to: &str) -> Connector {
    Connector::new(cid(id), sid(from), sid(to))
}

/// `group1` (0,0) containing `child1` (10,10), which contains `grandchild` (20,20); `loose`
/// sits outside the group and is connected to `child1`.
pub(crate) fn nested_groups() -> Diagram {
    let group = Shape::new(sid("group1"), kinds::GROUP, Bounds::new(0.0, 0.0, 400.0, 300.0));
    Diagram::with_entities(
        did("d1"),
        DiagramKind::Architecture,
        [
            group,
            rect("child1", 10.0, 10.0).with_parent(sid("group1")),
            rect("grandchild", 20.0, 20.0).with_parent(sid("child1")),
            rect("loose", 500.0, 500.0),
        ],
        [edge("c1", "loose", "child1")],
    )
    .expect("nested groups fixture")
}

/// A flowchart holding one generator shape at (100, 200) and an unrelated node.
pub(crate) fn flowchart_with_generator() -> Diagram {
    let bounds = Bounds::new(100.0, 200.0, 240.0, 120.0);
    let generator = Shape::new(sid("gen1"), kinds::GENERATOR, bounds)
        .with_data(json!({ "prompt": "checkout flow" }));
    Diagram::with_entities(
        did("d1"),
        DiagramKind::Flowchart,
        [generator, rect("existing", 0.0, 0.0)],
        [],
    )
    .expect("generator fixture")
}

pub(crate) fn lifeline(id: &str, x: f64, height: f64) -> Shape {
    Shape::new(sid(id), kinds::LIFELINE, Bounds::new(x, 0.0, 120.0, height))
        .with_data(json!({ "label": id }))
}

pub(crate) fn message(id: &str, from: &str, to: &str, y: f64, style: LineStyle) -> Connector {
    Connector::new(cid(id), sid(from), sid(to))
        .with_line_style(style)
        .with_points([Point::new(0.0, y)])
}

/// Two lifelines with one call/return pair: `alice` calls `bob` at 100, `bob` returns at 160.
pub(crate) fn sequence_call_return() -> Diagram {
    Diagram::with_entities(
        did("seq"),
        DiagramKind::Sequence,
        [lifeline("alice", 0.0, 300.0), lifeline("bob", 200.0, 300.0)],
        [
            message("m1", "alice", "bob", 100.0, LineStyle::Solid),
            message("m2", "bob", "alice", 160.0, LineStyle::Dashed),
        ],
    )
    .expect("sequence fixture")
}
