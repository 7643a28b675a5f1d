// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use log::trace;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{kinds, Connector, EndMarker, LineStyle, Shape, ShapeId};

/// One activation period on a lifeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationBox {
    start_y: f64,
    end_y: f64,
    depth: u32,
}

impl ActivationBox {
    pub fn new(start_y: f64, end_y: f64, depth: u32) -> Self {
        Self { start_y, end_y, depth }
    }

    pub fn start_y(&self) -> f64 {
        self.start_y
    }

    pub fn end_y(&self) -> f64 {
        self.end_y
    }

    /// Nesting level; 0 is the outermost box on the lifeline.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

pub type ActivationMap = BTreeMap<ShapeId, Vec<ActivationBox>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Call,
    Async,
    Return,
}

impl MessageKind {
    /// Dashed/dotted lines are returns, open arrowheads are fire-and-forget, anything else is a
    /// synchronous call.
    pub fn of(connector: &Connector) -> Self {
        match (connector.line_style(), connector.end_marker()) {
            (LineStyle::Dashed | LineStyle::Dotted, _) => Self::Return,
            (LineStyle::Solid, EndMarker::OpenArrow) => Self::Async,
            (LineStyle::Solid, _) => Self::Call,
        }
    }
}

/// The vertical position of a sequence message: the y of its first routing point.
pub fn message_y(connector: &Connector) -> Option<f64> {
    connector.points().first().map(|p| p.y())
}

#[derive(Debug, Clone, Copy)]
struct OpenActivation {
    start_y: f64,
    depth: u32,
}

/// Derives activation boxes from message topology.
///
/// Messages are processed top to bottom. A call opens a box on the receiving lifeline (self
/// calls nest on the caller), a return closes the sender's innermost open box. Boxes still open
/// after the last message end at the bottom of their lifeline. Every lifeline gets an entry,
/// possibly empty.
pub fn compute_activations<'a>(
    shapes: impl IntoIterator<Item = &'a Shape>,
    connectors: impl IntoIterator<Item = &'a Connector>,
) -> ActivationMap {
    let lifelines = shapes
        .into_iter()
        .filter(|shape| shape.kind() == kinds::LIFELINE)
        .map(|shape| (shape.id().clone(), shape))
        .collect::<BTreeMap<_, _>>();

    let mut messages = connectors
        .into_iter()
        .filter(|c| {
            lifelines.contains_key(c.source_shape_id())
                && lifelines.contains_key(c.target_shape_id())
        })
        .filter_map(|c| message_y(c).map(|y| (y, c)))
        .collect::<Vec<_>>();
    messages.sort_by(|(ya, a), (yb, b)| ya.total_cmp(yb).then_with(|| a.id().cmp(b.id())));

    let mut open = BTreeMap::<&ShapeId, SmallVec<[OpenActivation; 4]>>::new();
    let mut out = lifelines.keys().map(|id| (id.clone(), Vec::new())).collect::<ActivationMap>();

    for (y, message) in messages {
        match MessageKind::of(message) {
            MessageKind::Call => {
                let stack = open.entry(message.target_shape_id()).or_default();
                let depth = stack.len() as u32;
                stack.push(OpenActivation { start_y: y, depth });
            }
            MessageKind::Async => {}
            MessageKind::Return => {
                let sender = message.source_shape_id();
                match open.get_mut(sender).and_then(|stack| stack.pop()) {
                    Some(activation) => {
                        if let Some(boxes) = out.get_mut(sender) {
                            boxes.push(ActivationBox::new(activation.start_y, y, activation.depth));
                        }
                    }
                    None => {
                        trace!(lifeline:% = sender, y = y; "return without open activation");
                    }
                }
            }
        }
    }

    for (lifeline_id, stack) in open {
        let bottom = lifelines.get(lifeline_id).map(|s| s.bounds().bottom()).unwrap_or(0.0);
        if let Some(boxes) = out.get_mut(lifeline_id) {
            for activation in stack {
                boxes.push(ActivationBox::new(
                    activation.start_y,
                    bottom.max(activation.start_y),
                    activation.depth,
                ));
            }
        }
    }

    for boxes in out.values_mut() {
        boxes.sort_by(|a, b| a.start_y.total_cmp(&b.start_y).then_with(|| a.depth.cmp(&b.depth)));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{compute_activations, ActivationBox, MessageKind};
    use crate::model::fixtures::{lifeline, message, rect, sequence_call_return, sid};
    use crate::model::{EndMarker, LineStyle};

    #[test]
    fn call_and_return_produce_one_box_on_the_callee() {
        let diagram = sequence_call_return();
        let activations =
            compute_activations(diagram.shapes().values(), diagram.connectors().values());

        assert_eq!(activations[&sid("bob")], vec![ActivationBox::new(100.0, 160.0, 0)]);
        assert!(activations[&sid("alice")].is_empty());
    }

    #[test]
    fn self_calls_nest_one_level_deeper() {
        let shapes = [lifeline("alice", 0.0, 400.0), lifeline("bob", 200.0, 400.0)];
        let connectors = [
            message("m1", "alice", "bob", 100.0, LineStyle::Solid),
            message("m2", "bob", "bob", 120.0, LineStyle::Solid),
            message("m3", "bob", "bob", 140.0, LineStyle::Dashed),
            message("m4", "bob", "alice", 160.0, LineStyle::Dashed),
        ];
        let activations = compute_activations(shapes.iter(), connectors.iter());

        assert_eq!(
            activations[&sid("bob")],
            vec![ActivationBox::new(100.0, 160.0, 0), ActivationBox::new(120.0, 140.0, 1)]
        );
    }

    #[test]
    fn unclosed_calls_run_to_the_lifeline_bottom_and_async_messages_do_not_activate() {
        let shapes = [lifeline("alice", 0.0, 300.0), lifeline("bob", 200.0, 250.0)];
        let connectors = [
            message("m1", "alice", "bob", 100.0, LineStyle::Solid),
            message("m2", "bob", "alice", 120.0, LineStyle::Solid)
                .with_markers(EndMarker::None, EndMarker::OpenArrow),
        ];
        let activations = compute_activations(shapes.iter(), connectors.iter());

        assert_eq!(activations[&sid("bob")], vec![ActivationBox::new(100.0, 250.0, 0)]);
        assert!(activations[&sid("alice")].is_empty());
    }

    #[test]
    fn non_lifeline_shapes_and_unrouted_messages_are_ignored() {
        let shapes = [lifeline("alice", 0.0, 300.0), rect("note", 0.0, 0.0)];
        let unrouted = crate::model::fixtures::edge("m1", "note", "alice");
        let activations = compute_activations(shapes.iter(), [unrouted].iter());

        assert_eq!(activations.len(), 1);
        assert!(activations[&sid("alice")].is_empty());
    }

    #[test]
    fn message_kind_follows_line_style_and_markers() {
        let call = message("m", "a", "b", 0.0, LineStyle::Solid);
        let ret = message("m", "a", "b", 0.0, LineStyle::Dashed);
        let fire = call.clone().with_markers(EndMarker::None, EndMarker::OpenArrow);
        assert_eq!(MessageKind::of(&call), MessageKind::Call);
        assert_eq!(MessageKind::of(&ret), MessageKind::Return);
        assert_eq!(MessageKind::of(&fire), MessageKind::Async);
    }
}
