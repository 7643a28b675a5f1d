// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Diagram format parsing/export.
//!
//! Currently this module focuses on a Mermaid-ish notation for flowcharts and sequence diagrams.

pub mod notation;

pub use notation::{
    ExportedNotation, IdentError, ImportedGraph, NotationCodec, NotationExportError,
    NotationMetadata, NotationParseError, SequenceGeometry, DEFAULT_NODE_SIZE,
};
