// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payouts Client - secure transport for the payouts REST API
//!
//! Every request body is signed with the client's key and encrypted for the
//! API (JWS inside JWE); every response body is decrypted and verified before
//! it is handed back. Rate-limit headers are tracked per client, and every
//! failure is reported through a typed error.
//!
//! ## Modules
//!
//! - `keys` - Key loading and validation (PEM, JWK, DER)
//! - `protection` - Sign-then-encrypt and decrypt-then-verify
//! - `rate_limit` - `X-RateLimit-*` header tracking
//! - `transport` - Request building, HTTP exchange and error mapping
//! - `config` - Typed configuration and environment loading
//! - `logging` - Tracing subscriber setup for binaries

pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod protection;
pub mod rate_limit;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError, EncryptionConfig};
pub use error::{ApiError, ErrorResponse, Phase};
pub use keys::{KeyConfig, KeyLoadError, KeyStore};
pub use protection::{PayloadProtector, ProtectedToken, ProtectionError};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
pub use transport::{ApiResponse, RequestSpec, TransportClient};
