// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::ids::ShapeId;
use super::shape::Shape;

/// Parent → children index derived from `parent_id` pointers.
///
/// The index is rebuilt on demand and never stored, so it cannot drift from the pointers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainmentIndex {
    children: BTreeMap<ShapeId, Vec<ShapeId>>,
}

impl ContainmentIndex {
    pub fn build<'a>(shapes: impl IntoIterator<Item = &'a Shape>) -> Self {
        let mut children = BTreeMap::<ShapeId, Vec<ShapeId>>::new();
        for shape in shapes {
            if let Some(parent_id) = shape.parent_id() {
                children.entry(parent_id.clone()).or_default().push(shape.id().clone());
            }
        }
        for ids in children.values_mut() {
            ids.sort();
        }
        Self { children }
    }

    pub fn children_of(&self, shape_id: &ShapeId) -> &[ShapeId] {
        self.children.get(shape_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_children(&self, shape_id: &ShapeId) -> bool {
        !self.children_of(shape_id).is_empty()
    }

    /// All transitive descendants in breadth-first order (not including `shape_id`).
    pub fn descendants_of(&self, shape_id: &ShapeId) -> Vec<ShapeId> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::<&ShapeId>::new();
        seen.insert(shape_id);

        let mut queue = VecDeque::from([shape_id]);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if seen.insert(child) {
                    out.push(child.clone());
                    queue.push_back(child);
                }
            }
        }

        out
    }
}
