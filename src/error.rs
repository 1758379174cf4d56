// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Errors returned by [`TransportClient`](crate::transport::TransportClient).

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::protection::ProtectionError;
use crate::rate_limit::RateLimitSnapshot;

/// Stage of a call at which an error arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestBuilding,
    Protection,
    Transport,
    ResponseUnprotection,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::RequestBuilding => "request-building",
            Phase::Protection => "protection",
            Phase::Transport => "transport",
            Phase::ResponseUnprotection => "response-unprotection",
        })
    }
}

/// One entry of the API's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// A non-2xx response, reported as received. Never decrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    /// First server-supplied message, or the status reason.
    pub message: String,
    pub errors: Vec<ServerErrorDetail>,
    /// Raw body text.
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ServerErrorDetail>,
}

impl ErrorResponse {
    /// Build from a status and raw body, picking up the structured
    /// `{"errors":[...]}` list when the body has one.
    pub fn new(status: StatusCode, body: String) -> Self {
        let errors = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.errors)
            .unwrap_or_default();
        let message = errors
            .iter()
            .find_map(|e| e.message.clone())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
        Self {
            status,
            message,
            errors,
            body,
        }
    }

    /// The body as JSON, when it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

/// Failure of a single API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be built (unbound placeholder, bad header...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The outgoing body could not be protected.
    #[error("request protection failed: {0}")]
    RequestProtection(#[source] ProtectionError),

    #[error("bad request ({0})")]
    BadRequest(ErrorResponse),

    #[error("unauthorized ({0})")]
    Unauthorized(ErrorResponse),

    #[error("forbidden ({0})")]
    Forbidden(ErrorResponse),

    #[error("not found ({0})")]
    NotFound(ErrorResponse),

    #[error("conflict ({0})")]
    Conflict(ErrorResponse),

    #[error("rate limited ({response}), resets in {}s", .rate_limit.seconds_until_reset())]
    RateLimited {
        response: ErrorResponse,
        rate_limit: RateLimitSnapshot,
    },

    #[error("server error ({0})")]
    ServerError(ErrorResponse),

    #[error("unexpected status ({0})")]
    UnexpectedStatus(ErrorResponse),

    #[error("request timed out")]
    Timeout,

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// A 2xx body failed decryption or verification.
    #[error("response integrity check failed: {0}")]
    ResponseIntegrityError(#[source] ProtectionError),

    /// A 2xx plain body was not valid JSON.
    #[error("invalid response body (status {status}): {message}")]
    InvalidResponse { status: StatusCode, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn phase(&self) -> Phase {
        match self {
            ApiError::InvalidRequest(_) => Phase::RequestBuilding,
            ApiError::RequestProtection(_) => Phase::Protection,
            ApiError::ResponseIntegrityError(_) | ApiError::InvalidResponse { .. } => {
                Phase::ResponseUnprotection
            }
            _ => Phase::Transport,
        }
    }

    /// HTTP status, for errors derived from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::InvalidResponse { status, .. } => Some(*status),
            _ => self.response().map(|r| r.status),
        }
    }

    /// The error response as received, for status-derived errors.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            ApiError::BadRequest(r)
            | ApiError::Unauthorized(r)
            | ApiError::Forbidden(r)
            | ApiError::NotFound(r)
            | ApiError::Conflict(r)
            | ApiError::ServerError(r)
            | ApiError::UnexpectedStatus(r)
            | ApiError::RateLimited { response: r, .. } => Some(r),
            _ => None,
        }
    }

    /// Server-supplied message, when there is one.
    pub fn server_message(&self) -> Option<&str> {
        self.response().map(|r| r.message.as_str())
    }

    /// Whether a caller may reasonably retry the same call.
    ///
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout | ApiError::NetworkUnreachable(_) | ApiError::ServerError(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::RequestProtection(_) => "request_protection",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::ServerError(_) => "server_error",
            ApiError::UnexpectedStatus(_) => "unexpected_status",
            ApiError::Timeout => "timeout",
            ApiError::NetworkUnreachable(_) => "network_unreachable",
            ApiError::ResponseIntegrityError(_) => "response_integrity",
            ApiError::InvalidResponse { .. } => "invalid_response",
            ApiError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_body_is_parsed() {
        let body = r#"{"errors":[{"message":"Amount is required","fieldName":"amount","code":"CONSTRAINT_VIOLATION"}]}"#;
        let response = ErrorResponse::new(StatusCode::BAD_REQUEST, body.to_string());

        assert_eq!(response.message, "Amount is required");
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].field_name.as_deref(), Some("amount"));
        assert_eq!(response.errors[0].code.as_deref(), Some("CONSTRAINT_VIOLATION"));
        assert_eq!(response.body, body);
    }

    #[test]
    fn plain_text_body_becomes_message() {
        let response = ErrorResponse::new(StatusCode::BAD_GATEWAY, "upstream down\n".to_string());
        assert_eq!(response.message, "upstream down");
        assert!(response.errors.is_empty());
    }

    #[test]
    fn empty_body_falls_back_to_reason() {
        let response = ErrorResponse::new(StatusCode::NOT_FOUND, String::new());
        assert_eq!(response.message, "Not Found");
    }

    #[test]
    fn phases_and_retryability() {
        let server = ApiError::ServerError(ErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            String::new(),
        ));
        assert_eq!(server.phase(), Phase::Transport);
        assert_eq!(server.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(server.is_retryable());

        let integrity = ApiError::ResponseIntegrityError(ProtectionError::AuthenticationFailed);
        assert_eq!(integrity.phase(), Phase::ResponseUnprotection);
        assert_eq!(integrity.status(), None);
        assert!(!integrity.is_retryable());

        assert_eq!(
            ApiError::InvalidRequest("x".into()).phase(),
            Phase::RequestBuilding
        );
        assert_eq!(
            ApiError::RequestProtection(ProtectionError::KeyUnwrapFailed).phase(),
            Phase::Protection
        );
        assert!(ApiError::Timeout.is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
    }

    #[test]
    fn rate_limited_message_mentions_reset() {
        let err = ApiError::RateLimited {
            response: ErrorResponse::new(StatusCode::TOO_MANY_REQUESTS, String::new()),
            rate_limit: RateLimitSnapshot::default(),
        };
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert!(err.to_string().contains("resets in 0s"));
        assert_eq!(err.error_code(), "rate_limited");
    }
}
