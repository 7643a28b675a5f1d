// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("must not be empty")]
    Empty,
    #[error("must not contain whitespace")]
    ContainsWhitespace,
    #[error("contains invalid character: '{ch}'")]
    InvalidChar { ch: char },
}

/// Notation identifiers are ASCII alphanumerics plus `_`.
pub(super) fn validate_ident(ident: &str) -> Result<(), IdentError> {
    if ident.is_empty() {
        return Err(IdentError::Empty);
    }
    if ident.chars().any(char::is_whitespace) {
        return Err(IdentError::ContainsWhitespace);
    }
    if let Some(ch) = ident.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(IdentError::InvalidChar { ch });
    }
    Ok(())
}

pub(super) fn is_valid_ident(ident: &str) -> bool {
    validate_ident(ident).is_ok()
}
