// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Where a key comes from: a file, inline text, or raw bytes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::KeyLoadError;
use super::material::KeyRole;

/// Source settings for one key role. Exactly one of `path`, `inline` or
/// `bytes` must be set.
#[derive(Clone, Default)]
pub struct KeySourceConfig {
    /// File holding PEM, JWK / JWK set JSON, or DER.
    pub path: Option<PathBuf>,
    /// PEM or JWK text.
    pub inline: Option<String>,
    /// Already-loaded PEM, JWK or DER bytes.
    pub bytes: Option<Vec<u8>>,
    /// Key id to select (JWK sets) or to assign (PEM / DER).
    pub key_id: Option<String>,
}

impl KeySourceConfig {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_inline(text: impl Into<String>) -> Self {
        Self {
            inline: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            ..Self::default()
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Whether any source field is set.
    pub fn is_configured(&self) -> bool {
        self.path.is_some() || self.inline.is_some() || self.bytes.is_some()
    }

    /// Pick the single configured source.
    pub fn resolve(&self, role: KeyRole) -> Result<KeySource<'_>, KeyLoadError> {
        let mut sources = Vec::with_capacity(1);
        if let Some(path) = &self.path {
            sources.push(KeySource::Path(path));
        }
        if let Some(text) = &self.inline {
            sources.push(KeySource::Inline(text));
        }
        if let Some(bytes) = &self.bytes {
            sources.push(KeySource::Bytes(bytes));
        }

        match sources.len() {
            0 => Err(KeyLoadError::MissingKey { role }),
            1 => Ok(sources.remove(0)),
            _ => Err(KeyLoadError::AmbiguousSource {
                role,
                reason: format!(
                    "{} sources configured ({}); exactly one is allowed",
                    sources.len(),
                    sources
                        .iter()
                        .map(KeySource::kind)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }
}

impl fmt::Debug for KeySourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySourceConfig")
            .field("path", &self.path)
            .field("inline", &self.inline.as_ref().map(|_| "<redacted>"))
            .field("bytes", &self.bytes.as_ref().map(|b| b.len()))
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// A resolved, unambiguous key source.
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    Path(&'a Path),
    Inline(&'a str),
    Bytes(&'a [u8]),
}

impl KeySource<'_> {
    fn kind(&self) -> &'static str {
        match self {
            KeySource::Path(_) => "path",
            KeySource::Inline(_) => "inline",
            KeySource::Bytes(_) => "bytes",
        }
    }

    /// Read the raw key document.
    pub(crate) fn read(&self, role: KeyRole) -> Result<Vec<u8>, KeyLoadError> {
        let bytes = match self {
            KeySource::Path(path) => fs::read(path).map_err(|e| KeyLoadError::Unreadable {
                role,
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            KeySource::Inline(text) => text.as_bytes().to_vec(),
            KeySource::Bytes(bytes) => bytes.to_vec(),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(KeyLoadError::MissingKey { role });
        }
        Ok(bytes)
    }
}
