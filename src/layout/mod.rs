// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Pure layout algorithms.
//!
//! `rank` places imported node sets on a rank grid; `activation` derives sequence-diagram
//! activation boxes from message topology.

pub mod activation;
pub mod rank;

pub use activation::{compute_activations, message_y, ActivationBox, ActivationMap, MessageKind};
pub use rank::{layout, LayoutDirection, LayoutEdge, LayoutOptions, NodePlacement, RankLayout};
