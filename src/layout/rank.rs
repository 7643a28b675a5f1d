// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, VecDeque};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::model::{Point, ShapeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    /// Ranks advance along x; nodes within a rank stack along y.
    #[default]
    LeftToRight,
    /// Ranks advance along y; nodes within a rank line up along x.
    TopToBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub direction: LayoutDirection,
    pub rank_spacing: f64,
    pub node_spacing: f64,
    pub origin: Point,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::LeftToRight,
            rank_spacing: 220.0,
            node_spacing: 140.0,
            origin: Point::ORIGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEdge {
    pub from: ShapeId,
    pub to: ShapeId,
    pub bidirectional: bool,
}

impl LayoutEdge {
    pub fn directed(from: ShapeId, to: ShapeId) -> Self {
        Self { from, to, bidirectional: false }
    }

    pub fn bidirectional(from: ShapeId, to: ShapeId) -> Self {
        Self { from, to, bidirectional: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePlacement {
    rank: usize,
    index_in_rank: usize,
    position: Point,
}

impl NodePlacement {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn index_in_rank(&self) -> usize {
        self.index_in_rank
    }

    pub fn position(&self) -> Point {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankLayout {
    ranks: Vec<Vec<ShapeId>>,
    placements: BTreeMap<ShapeId, NodePlacement>,
}

impl RankLayout {
    pub fn ranks(&self) -> &[Vec<ShapeId>] {
        &self.ranks
    }

    pub fn placements(&self) -> &BTreeMap<ShapeId, NodePlacement> {
        &self.placements
    }

    pub fn placement(&self, node_id: &ShapeId) -> Option<&NodePlacement> {
        self.placements.get(node_id)
    }

    pub fn rank_of(&self, node_id: &ShapeId) -> Option<usize> {
        self.placement(node_id).map(NodePlacement::rank)
    }
}

/// Rank-based grid layout.
///
/// - Builds a directed adjacency from `edges`; a bidirectional edge contributes both directions.
/// - Nodes with no incoming edges start at rank 0 and ranks propagate in topological order:
///   `rank(v) = max(rank(v), rank(u) + 1)` for each processed predecessor `u`.
/// - Cycles are broken by releasing the earliest unprocessed node in discovery order.
/// - Within a rank, nodes keep their order in `nodes`.
///
/// Edges that reference nodes outside `nodes` are ignored.
pub fn layout(nodes: &[ShapeId], edges: &[LayoutEdge], options: &LayoutOptions) -> RankLayout {
    let mut order = Vec::<&ShapeId>::with_capacity(nodes.len());
    let mut index = BTreeMap::<&ShapeId, usize>::new();
    for node_id in nodes {
        if !index.contains_key(node_id) {
            index.insert(node_id, order.len());
            order.push(node_id);
        }
    }

    let mut outgoing = vec![Vec::<usize>::new(); order.len()];
    let mut indegree = vec![0usize; order.len()];
    for edge in edges {
        let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
            warn!(from:% = edge.from, to:% = edge.to; "layout edge references unknown node");
            continue;
        };
        if from == to {
            continue;
        }
        outgoing[from].push(to);
        indegree[to] += 1;
        if edge.bidirectional {
            outgoing[to].push(from);
            indegree[from] += 1;
        }
    }

    let ranks_by_index = assign_ranks(&outgoing, indegree);

    let max_rank = ranks_by_index.iter().copied().max().unwrap_or(0);
    let mut ranks = vec![Vec::<ShapeId>::new(); if order.is_empty() { 0 } else { max_rank + 1 }];
    let mut placements = BTreeMap::<ShapeId, NodePlacement>::new();
    for (idx, node_id) in order.iter().enumerate() {
        let rank = ranks_by_index[idx];
        let index_in_rank = ranks[rank].len();
        ranks[rank].push((*node_id).clone());

        let primary = rank as f64 * options.rank_spacing;
        let secondary = index_in_rank as f64 * options.node_spacing;
        let position = match options.direction {
            LayoutDirection::LeftToRight => options.origin.offset(primary, secondary),
            LayoutDirection::TopToBottom => options.origin.offset(secondary, primary),
        };
        placements.insert((*node_id).clone(), NodePlacement { rank, index_in_rank, position });
    }

    RankLayout { ranks, placements }
}

fn assign_ranks(outgoing: &[Vec<usize>], mut indegree: Vec<usize>) -> Vec<usize> {
    let len = outgoing.len();
    let mut rank = vec![0usize; len];
    let mut processed = vec![false; len];
    let mut remaining = len;

    let mut queue = (0..len).filter(|&idx| indegree[idx] == 0).collect::<VecDeque<_>>();
    while remaining > 0 {
        let Some(current) = queue.pop_front() else {
            // Only cycles are left: release the earliest unprocessed node.
            if let Some(next) = (0..len).find(|&idx| !processed[idx]) {
                queue.push_back(next);
            }
            continue;
        };
        if processed[current] {
            continue;
        }
        processed[current] = true;
        remaining -= 1;

        for &next in &outgoing[current] {
            if processed[next] {
                continue;
            }
            rank[next] = rank[next].max(rank[current] + 1);
            indegree[next] = indegree[next].saturating_sub(1);
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    rank
}
