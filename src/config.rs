// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Configuration
//!
//! [`ClientConfig`] can be built in code or loaded from the environment with
//! [`ClientConfig::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PAYOUTS_BASE_URL` | API server root, e.g. `https://api.example.com` | Required |
//! | `PAYOUTS_API_VERSION` | Value bound to `{version}` in URI templates | `v4` |
//! | `PAYOUTS_USERNAME` | Basic-auth user | Required |
//! | `PAYOUTS_PASSWORD` | Basic-auth password | Required |
//! | `PAYOUTS_PROGRAM_TOKEN` | Default program token for created records | None |
//! | `PAYOUTS_TIMEOUT_SECS` | Per-request timeout | `30` |
//! | `PAYOUTS_<ROLE>_KEY_PATH` | Key file (PEM, JWK, JWK set or DER) | None |
//! | `PAYOUTS_<ROLE>_KEY_PEM` | Inline PEM or JWK text (`\n` escapes allowed) | None |
//! | `PAYOUTS_<ROLE>_KEY_ID` | Key id to select or assign | JWK thumbprint |
//! | `PAYOUTS_SIGNING_ALG` | `RS256` or `PS256` | `RS256` |
//! | `PAYOUTS_KEY_MANAGEMENT_ALG` | `RSA-OAEP-256` | `RSA-OAEP-256` |
//! | `PAYOUTS_CONTENT_ENCRYPTION_ALG` | `A256GCM` or `A128GCM` | `A256GCM` |
//! | `PAYOUTS_TOKEN_TTL_SECS` | Lifetime of outgoing signed tokens | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |
//!
//! `<ROLE>` is one of `SIGNING`, `DECRYPTION`, `PEER_ENCRYPTION` and
//! `PEER_VERIFICATION`. Payload encryption is turned on when any key variable
//! is set; all four roles must then be configured.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::keys::{KeyConfig, KeyLoadError, KeyRole, KeySourceConfig};
use crate::protection::{AlgorithmSuite, ProtectionError, DEFAULT_TOKEN_TTL};

pub const BASE_URL_ENV: &str = "PAYOUTS_BASE_URL";
pub const API_VERSION_ENV: &str = "PAYOUTS_API_VERSION";
pub const USERNAME_ENV: &str = "PAYOUTS_USERNAME";
pub const PASSWORD_ENV: &str = "PAYOUTS_PASSWORD";
pub const PROGRAM_TOKEN_ENV: &str = "PAYOUTS_PROGRAM_TOKEN";
pub const TIMEOUT_SECS_ENV: &str = "PAYOUTS_TIMEOUT_SECS";
pub const SIGNING_ALG_ENV: &str = "PAYOUTS_SIGNING_ALG";
pub const KEY_MANAGEMENT_ALG_ENV: &str = "PAYOUTS_KEY_MANAGEMENT_ALG";
pub const CONTENT_ENCRYPTION_ALG_ENV: &str = "PAYOUTS_CONTENT_ENCRYPTION_ALG";
pub const TOKEN_TTL_SECS_ENV: &str = "PAYOUTS_TOKEN_TTL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_API_VERSION: &str = "v4";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_USER_AGENT: &str = concat!("payouts-client/", env!("CARGO_PKG_VERSION"));

/// Configuration and client construction errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingVar(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("invalid algorithm in {name}: {source}")]
    Algorithm {
        name: String,
        #[source]
        source: ProtectionError,
    },

    #[error(transparent)]
    Keys(#[from] KeyLoadError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Payload encryption settings.
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub keys: KeyConfig,
    pub algorithms: AlgorithmSuite,
    pub token_ttl: Duration,
}

impl EncryptionConfig {
    pub fn new(keys: KeyConfig) -> Self {
        Self {
            keys,
            algorithms: AlgorithmSuite::default(),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_algorithms(mut self, algorithms: AlgorithmSuite) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }
}

/// Everything needed to build a [`TransportClient`](crate::transport::TransportClient).
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_version: String,
    pub username: String,
    pub password: String,
    pub program_token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
    /// `None` sends and expects plain JSON.
    pub encryption: Option<EncryptionConfig>,
}

impl ClientConfig {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(BASE_URL_ENV, base_url)?,
            api_version: DEFAULT_API_VERSION.to_string(),
            username: username.into(),
            password: password.into(),
            program_token: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            encryption: None,
        })
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_program_token(mut self, program_token: impl Into<String>) -> Self {
        self.program_token = Some(program_token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Load from process environment variables (see module docs).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required =
            |name: &str| get(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));

        let base_url = required(BASE_URL_ENV)?;
        let mut config = Self::new(&base_url, required(USERNAME_ENV)?, required(PASSWORD_ENV)?)?;

        if let Some(version) = get(API_VERSION_ENV) {
            config.api_version = version;
        }
        config.program_token = get(PROGRAM_TOKEN_ENV);
        if let Some(secs) = get(TIMEOUT_SECS_ENV) {
            config.timeout = Duration::from_secs(parse_secs(TIMEOUT_SECS_ENV, &secs)?);
        }

        let keys = key_config_from(&get);
        if keys.is_configured() {
            let mut encryption = EncryptionConfig::new(keys);
            if let Some(alg) = get(SIGNING_ALG_ENV) {
                encryption.algorithms.signing = parse_alg(SIGNING_ALG_ENV, &alg)?;
            }
            if let Some(alg) = get(KEY_MANAGEMENT_ALG_ENV) {
                encryption.algorithms.key_management = parse_alg(KEY_MANAGEMENT_ALG_ENV, &alg)?;
            }
            if let Some(alg) = get(CONTENT_ENCRYPTION_ALG_ENV) {
                encryption.algorithms.content_encryption =
                    parse_alg(CONTENT_ENCRYPTION_ALG_ENV, &alg)?;
            }
            if let Some(secs) = get(TOKEN_TTL_SECS_ENV) {
                encryption.token_ttl = Duration::from_secs(parse_secs(TOKEN_TTL_SECS_ENV, &secs)?);
            }
            config.encryption = Some(encryption);
        }

        Ok(config)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("program_token", &self.program_token)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("encryption", &self.encryption)
            .finish()
    }
}

/// Environment prefix for a key role, e.g. `PAYOUTS_PEER_ENCRYPTION`.
pub fn key_env_prefix(role: KeyRole) -> &'static str {
    match role {
        KeyRole::Signing => "PAYOUTS_SIGNING",
        KeyRole::Decryption => "PAYOUTS_DECRYPTION",
        KeyRole::PeerEncryption => "PAYOUTS_PEER_ENCRYPTION",
        KeyRole::PeerVerification => "PAYOUTS_PEER_VERIFICATION",
    }
}

fn key_config_from(get: &impl Fn(&str) -> Option<String>) -> KeyConfig {
    let source = |role: KeyRole| {
        let prefix = key_env_prefix(role);
        KeySourceConfig {
            path: get(&format!("{prefix}_KEY_PATH")).map(PathBuf::from),
            inline: get(&format!("{prefix}_KEY_PEM")).map(|pem| pem.replace("\\n", "\n")),
            bytes: None,
            key_id: get(&format!("{prefix}_KEY_ID")),
        }
    };
    KeyConfig {
        signing: source(KeyRole::Signing),
        decryption: source(KeyRole::Decryption),
        peer_encryption: source(KeyRole::PeerEncryption),
        peer_verification: source(KeyRole::PeerVerification),
    }
}

fn parse_base_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("{value} is not an http(s) base URL"),
        });
    }
    Ok(url)
}

fn parse_secs(name: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("expected a positive number of seconds, got `{value}`"),
        }),
    }
}

fn parse_alg<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ProtectionError>,
{
    value.parse().map_err(|source| ConfigError::Algorithm {
        name: name.to_string(),
        source,
    })
}
