// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model.
//!
//! A diagram holds shapes (positioned entities with opaque `data`) and connectors between them.
//! Containment is a parent pointer on the child; the parent → children view is derived.

pub mod connector;
pub mod containment;
pub mod diagram;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod geometry;
pub mod ids;
pub mod legacy;
pub mod shape;

pub use connector::{Connector, EndMarker, LineStyle, RoutingPoints};
pub use containment::ContainmentIndex;
pub use diagram::{Diagram, DiagramKind, InvariantViolation, PreviewGroup};
pub use geometry::{Bounds, Point, Size};
pub use ids::{ConnectorId, DiagramId, Id, IdError, ShapeId};
pub use legacy::{diagram_from_legacy_json, LegacyError};
pub use shape::{kinds, OverlayTag, Shape};
