// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transport Client
//!
//! Executes [`RequestSpec`]s against the API:
//!
//! 1. expand the URI template (fails before any I/O on unbound placeholders)
//! 2. protect a JSON body when payload encryption is configured
//! 3. send with basic credentials and an `X-Request-Id`
//! 4. record the rate-limit headers, whatever the status
//! 5. map non-2xx to [`ApiError`] with the body as received
//! 6. unprotect (or parse) a 2xx body
//!
//! Multipart uploads are never protected. Error responses are never
//! decrypted. The client performs no retries.

mod request;
mod response;

pub use request::{
    FilePart, MultipartBody, RequestBody, RequestSpec, MULTIPART_DATA_PART, VERSION_PLACEHOLDER,
};
pub use response::ApiResponse;

use std::fmt;
use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError};
use crate::error::ApiError;
use crate::keys::KeyStore;
use crate::protection::{PayloadProtector, PROTECTED_CONTENT_TYPE};
use crate::rate_limit::RateLimitTracker;
use response::{error_from_status, map_transport_error};

/// Header carrying the per-call request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Field the default program token is written to.
pub const PROGRAM_TOKEN_FIELD: &str = "programToken";

/// HTTP client for the payouts API.
///
/// Cheap to clone; clones share the connection pool, the key store and the
/// rate-limit tracker.
#[derive(Clone)]
pub struct TransportClient {
    http: reqwest::Client,
    base_url: Url,
    api_version: String,
    username: String,
    password: String,
    program_token: Option<String>,
    protector: Option<PayloadProtector>,
    rate_limits: Arc<RateLimitTracker>,
}

impl TransportClient {
    /// Build a client, loading and validating keys when encryption is
    /// configured.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let protector = match &config.encryption {
            Some(encryption) => {
                let keys = KeyStore::load(&encryption.keys, &encryption.algorithms)?;
                Some(
                    PayloadProtector::new(Arc::new(keys), encryption.algorithms)
                        .with_token_ttl(encryption.token_ttl),
                )
            }
            None => None,
        };

        info!(
            base_url = %config.base_url,
            api_version = %config.api_version,
            encrypted = protector.is_some(),
            timeout_secs = config.timeout.as_secs(),
            "Payouts transport client configured"
        );

        Ok(Self {
            http,
            base_url: config.base_url,
            api_version: config.api_version,
            username: config.username,
            password: config.password,
            program_token: config.program_token,
            protector,
            rate_limits: Arc::new(RateLimitTracker::new()),
        })
    }

    /// Build from environment variables (see [`crate::config`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Use `protector` for every call, replacing any configured one.
    pub fn with_protector(mut self, protector: PayloadProtector) -> Self {
        self.protector = Some(protector);
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.protector.is_some()
    }

    pub fn protector(&self) -> Option<&PayloadProtector> {
        self.protector.as_ref()
    }

    pub fn rate_limits(&self) -> &RateLimitTracker {
        &self.rate_limits
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Default program token for created records, if configured.
    pub fn program_token(&self) -> Option<&str> {
        self.program_token.as_deref()
    }

    /// Write the default program token into `record` unless it already sets
    /// one. Non-object records are left alone.
    pub fn apply_program_token(&self, record: &mut Value) {
        let (Some(token), Some(fields)) = (&self.program_token, record.as_object_mut()) else {
            return;
        };
        match fields.get(PROGRAM_TOKEN_FIELD) {
            None | Some(Value::Null) => {
                fields.insert(PROGRAM_TOKEN_FIELD.to_string(), Value::String(token.clone()));
            }
            Some(_) => {}
        }
    }

    /// Execute one call.
    pub async fn send(&self, mut spec: RequestSpec) -> Result<ApiResponse, ApiError> {
        let request_id = Uuid::new_v4();
        let url = spec.build_url(&self.base_url, &self.api_version)?;
        let extra_headers = spec.header_map()?;
        let method = spec.method().clone();
        let path = url.path().to_string();

        let accept = if self.is_encrypted() {
            PROTECTED_CONTENT_TYPE
        } else {
            JSON_CONTENT_TYPE
        };
        let mut builder = self
            .http
            .request(method.clone(), url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, accept)
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .headers(extra_headers);
        if let Some(timeout) = spec.timeout_override() {
            builder = builder.timeout(timeout);
        }

        builder = match spec.take_body() {
            Some(RequestBody::Json(body)) => match &self.protector {
                Some(protector) => {
                    let token = protector.protect(&body).map_err(|e| {
                        warn!(%request_id, error = %e, "Failed to protect request body");
                        ApiError::RequestProtection(e)
                    })?;
                    builder
                        .header(CONTENT_TYPE, PROTECTED_CONTENT_TYPE)
                        .body(token.into_string())
                }
                None => builder.json(&body),
            },
            Some(RequestBody::Multipart(body)) => builder.multipart(body.into_form()?),
            None => builder,
        };

        debug!(%request_id, %method, %path, "Sending request");
        let response = builder.send().await.map_err(|e| {
            let err = map_transport_error(e);
            warn!(%request_id, %method, %path, error = %err, "Request failed");
            err
        })?;

        let status = response.status();
        let rate_limit = self.rate_limits.update(response.headers());
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let err = error_from_status(status, body, rate_limit);
            warn!(
                %request_id,
                %method,
                %path,
                status = status.as_u16(),
                error_code = err.error_code(),
                "API returned error status"
            );
            return Err(err);
        }

        let body = self.read_body(status, &body).map_err(|err| {
            warn!(%request_id, %method, %path, error = %err, "Rejected response body");
            err
        })?;
        debug!(%request_id, %method, %path, status = status.as_u16(), "Request completed");

        Ok(ApiResponse {
            status,
            body,
            rate_limit,
        })
    }

    /// Like [`send`](Self::send), aborting the in-flight call when `cancel`
    /// fires.
    pub async fn send_cancellable(
        &self,
        spec: RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        let template = spec.template().to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%template, "Request cancelled");
                Err(ApiError::Cancelled)
            }
            result = self.send(spec) => result,
        }
    }

    fn read_body(&self, status: StatusCode, body: &str) -> Result<Value, ApiError> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(Value::Null);
        }
        match &self.protector {
            Some(protector) => protector
                .unprotect(body)
                .map_err(ApiError::ResponseIntegrityError),
            None => serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse {
                status,
                message: e.to_string(),
            }),
        }
    }
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("program_token", &self.program_token)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
