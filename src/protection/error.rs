// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payload protection errors.

/// Failure while protecting or unprotecting a payload.
///
/// Never retried: resending the same payload fails the same way.
/// `KeyUnwrapFailed` and `AuthenticationFailed` carry no detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtectionError {
    /// Algorithm identifier is not in the registry or not allowed by configuration.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key cannot be used for the requested operation.
    #[error("key does not fit {algorithm}: {reason}")]
    KeyMismatch { algorithm: String, reason: String },

    /// Token structure or encoding is invalid.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Content-encryption key could not be recovered.
    #[error("content encryption key could not be unwrapped")]
    KeyUnwrapFailed,

    /// Ciphertext or authentication tag was altered.
    #[error("authentication tag verification failed")]
    AuthenticationFailed,

    /// Inner signature did not verify.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Signed token lifetime has passed.
    #[error("signed token expired at {expired_at}")]
    Expired { expired_at: i64 },
}

impl ProtectionError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtectionError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            ProtectionError::KeyMismatch { .. } => "key_mismatch",
            ProtectionError::MalformedToken(_) => "malformed_token",
            ProtectionError::KeyUnwrapFailed => "key_unwrap_failed",
            ProtectionError::AuthenticationFailed => "authentication_failed",
            ProtectionError::SignatureInvalid(_) => "signature_invalid",
            ProtectionError::Expired { .. } => "token_expired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_variants_carry_no_detail() {
        assert_eq!(
            ProtectionError::KeyUnwrapFailed.to_string(),
            "content encryption key could not be unwrapped"
        );
        assert_eq!(
            ProtectionError::AuthenticationFailed.to_string(),
            "authentication tag verification failed"
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            ProtectionError::UnsupportedAlgorithm("HS256".into()).error_code(),
            "unsupported_algorithm"
        );
        assert_eq!(
            ProtectionError::Expired { expired_at: 1 }.error_code(),
            "token_expired"
        );
    }
}
