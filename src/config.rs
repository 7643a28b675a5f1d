// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! missing_shapes = "strict"
//! history_depth = 50
//!
//! [layout]
//! direction = "top_to_bottom"
//! rank_spacing = 200.0
//!
//! [lifelines]
//! min_height = 320.0
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::format::notation::{NotationCodec, SequenceGeometry, DEFAULT_NODE_SIZE};
use crate::layout::LayoutOptions;
use crate::model::Size;

/// What a cascading command does when a shape it was asked to touch no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingShapePolicy {
    /// Skip the shape and carry on with the rest (stale selections are tolerated).
    #[default]
    Skip,
    /// Fail the whole command before anything is written.
    Strict,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub missing_shapes: MissingShapePolicy,
    /// Maximum number of undo entries kept per diagram; the oldest entry is dropped first.
    pub history_depth: usize,
    pub layout: LayoutOptions,
    pub node_size: Size,
    pub lifelines: SequenceGeometry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            missing_shapes: MissingShapePolicy::Skip,
            history_depth: 100,
            layout: LayoutOptions::default(),
            node_size: DEFAULT_NODE_SIZE,
            lifelines: SequenceGeometry::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn codec(&self) -> NotationCodec {
        NotationCodec::new(self.layout, self.node_size, self.lifelines)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "history_depth",
                reason: "must be at least 1".to_owned(),
            });
        }
        let positive = [
            ("layout.rank_spacing", self.layout.rank_spacing),
            ("layout.node_spacing", self.layout.node_spacing),
            ("node_size.width", self.node_size.width()),
            ("node_size.height", self.node_size.height()),
            ("lifelines.min_height", self.lifelines.min_height),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                let reason = format!("must be > 0, got {value}");
                return Err(ConfigError::Invalid { field, reason });
            }
        }
        Ok(())
    }
}
