// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Status and transport failure mapping. The only place status codes are
//! interpreted.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ErrorResponse};
use crate::rate_limit::RateLimitSnapshot;

/// A successful call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    #[serde(with = "status_code")]
    pub status: StatusCode,
    /// Decrypted and verified (or plain) JSON body; `null` when empty.
    pub body: Value,
    pub rate_limit: RateLimitSnapshot,
}

mod status_code {
    use reqwest::StatusCode;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(status.as_u16())
    }
}

/// Map a non-2xx response to its error. The body is kept as received.
pub(crate) fn error_from_status(
    status: StatusCode,
    body: String,
    rate_limit: RateLimitSnapshot,
) -> ApiError {
    let response = ErrorResponse::new(status, body);
    match status.as_u16() {
        400 => ApiError::BadRequest(response),
        401 => ApiError::Unauthorized(response),
        403 => ApiError::Forbidden(response),
        404 => ApiError::NotFound(response),
        409 => ApiError::Conflict(response),
        429 => ApiError::RateLimited {
            response,
            rate_limit,
        },
        500..=599 => ApiError::ServerError(response),
        _ => ApiError::UnexpectedStatus(response),
    }
}

pub(crate) fn map_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_builder() {
        ApiError::InvalidRequest(err.to_string())
    } else {
        // connect, request and body failures all mean the exchange did not complete
        ApiError::NetworkUnreachable(err.without_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        let cases: &[(u16, &str)] = &[
            (400, "bad_request"),
            (401, "unauthorized"),
            (403, "forbidden"),
            (404, "not_found"),
            (409, "conflict"),
            (429, "rate_limited"),
            (500, "server_error"),
            (503, "server_error"),
            (302, "unexpected_status"),
            (418, "unexpected_status"),
        ];
        for (code, expected) in cases {
            let status = StatusCode::from_u16(*code).unwrap();
            let err = error_from_status(status, String::new(), RateLimitSnapshot::default());
            assert_eq!(err.error_code(), *expected, "{code}");
            assert_eq!(err.status(), Some(status));
        }
    }

    #[test]
    fn rate_limited_carries_snapshot() {
        let snapshot = RateLimitSnapshot {
            limit: 50,
            remaining: 0,
            reset_at: 1_900_000_000,
        };
        match error_from_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into(), snapshot) {
            ApiError::RateLimited {
                response,
                rate_limit,
            } => {
                assert_eq!(rate_limit, snapshot);
                assert_eq!(response.message, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
