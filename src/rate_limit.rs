// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rate-limit state reported by the API.
//!
//! Every response carries:
//!
//! | Header | Meaning |
//! |--------|---------|
//! | `X-RateLimit-Limit` | requests allowed in the current window |
//! | `X-RateLimit-Remaining` | requests left in the window |
//! | `X-RateLimit-Reset` | Unix time (seconds) the window resets |
//!
//! The tracker keeps only the most recent snapshot. It is replaced wholesale
//! on every response, including error responses.

use std::sync::Arc;

use arc_swap::ArcSwap;
use reqwest::header::HeaderMap;
use serde::Serialize;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Rate-limit state as of one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds; 0 when the server did not say.
    pub reset_at: i64,
}

impl RateLimitSnapshot {
    /// Read the three headers. Absent or unparsable values become 0.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_value(headers, LIMIT_HEADER).unwrap_or(0),
            remaining: header_value(headers, REMAINING_HEADER).unwrap_or(0),
            reset_at: header_value(headers, RESET_HEADER).unwrap_or(0),
        }
    }

    /// No requests left and a known reset time.
    pub fn is_throttled(&self) -> bool {
        self.remaining == 0 && self.reset_at > 0
    }

    /// Seconds until the window resets, never negative.
    pub fn seconds_until_reset(&self) -> i64 {
        self.seconds_until_reset_at(chrono::Utc::now().timestamp())
    }

    pub fn seconds_until_reset_at(&self, now: i64) -> i64 {
        if self.reset_at == 0 {
            return 0;
        }
        self.reset_at.saturating_sub(now).max(0)
    }
}

// HeaderMap::get returns the first value for a repeated header.
fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Latest rate-limit snapshot, shared by every call on a client.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    current: ArcSwap<RateLimitSnapshot>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with one read from `headers` and return it.
    pub fn update(&self, headers: &HeaderMap) -> RateLimitSnapshot {
        let snapshot = RateLimitSnapshot::from_headers(headers);
        self.current.store(Arc::new(snapshot));
        tracing::trace!(
            limit = snapshot.limit,
            remaining = snapshot.remaining,
            reset_at = snapshot.reset_at,
            "Rate limit updated"
        );
        snapshot
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        **self.current.load()
    }

    pub fn is_throttled(&self) -> bool {
        self.snapshot().is_throttled()
    }

    pub fn seconds_until_reset(&self) -> i64 {
        self.snapshot().seconds_until_reset()
    }
}
