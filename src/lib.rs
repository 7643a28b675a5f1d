// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Tessera: an undoable command engine for shape/connector diagrams.
//!
//! Diagrams live in a [`store::GraphStore`]. Every mutation runs as a [`command::Command`]
//! through a [`command::CommandManager`], which keeps one undo/redo history per diagram.
//! Notation text (flowchart and sequence dialects) is imported through
//! [`format::NotationCodec`] into uncommitted preview groups that can be regenerated, applied or
//! discarded; [`layout`] holds the pure rank layout and activation calculators those paths use.

pub mod command;
pub mod config;
pub mod format;
pub mod layout;
pub mod model;
pub mod store;

pub use command::{Command, CommandContext, CommandError, CommandLog, CommandManager};
pub use config::{ConfigError, EngineConfig, MissingShapePolicy};
pub use format::NotationCodec;
pub use model::{Connector, ConnectorId, Diagram, DiagramId, DiagramKind, Shape, ShapeId};
pub use store::{GraphStore, MemoryStore, StoreError};
