// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key loading errors.

use super::material::KeyRole;

/// Failure while loading key material at client construction.
///
/// Always fatal: the client cannot be built, and retrying with the same
/// configuration fails the same way.
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    /// No source configured for the role, or the source holds no usable key.
    #[error("no {role} key configured")]
    MissingKey { role: KeyRole },

    /// More than one source, or more than one candidate key, for the role.
    #[error("{role} key source is ambiguous: {reason}")]
    AmbiguousSource { role: KeyRole, reason: String },

    /// The key cannot be used with the configured algorithms.
    #[error("{role} key is incompatible: {reason}")]
    Incompatible { role: KeyRole, reason: String },

    /// The configured file could not be read.
    #[error("failed to read {role} key from {path}: {reason}")]
    Unreadable {
        role: KeyRole,
        path: String,
        reason: String,
    },
}

impl KeyLoadError {
    pub(crate) fn incompatible(role: KeyRole, reason: impl Into<String>) -> Self {
        KeyLoadError::Incompatible {
            role,
            reason: reason.into(),
        }
    }

    /// Role whose key failed to load.
    pub fn role(&self) -> KeyRole {
        match self {
            KeyLoadError::MissingKey { role }
            | KeyLoadError::AmbiguousSource { role, .. }
            | KeyLoadError::Incompatible { role, .. }
            | KeyLoadError::Unreadable { role, .. } => *role,
        }
    }
}
