// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payload Protection
//!
//! Outgoing bodies are signed, then encrypted. Incoming bodies are decrypted,
//! then verified. Both layers use compact JOSE serialization:
//!
//! ```text
//! outer  header.encrypted_key.iv.ciphertext.tag   (RSA-OAEP-256 + AES-GCM)
//!          └── plaintext: header.payload.signature (RS256 / PS256)
//! ```
//!
//! The inner signature header carries an `exp` marked critical. Tokens past
//! their expiry (with [`CLOCK_SKEW_LEEWAY`] seconds of slack) are refused.
//!
//! Every failure is an error. Nothing here ever yields an empty or partially
//! decrypted payload.

pub mod algorithms;
pub mod error;
mod jwe;
mod jws;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::keys::KeyStore;
pub use algorithms::{
    AlgorithmSuite, ContentEncryptionAlgorithm, KeyManagementAlgorithm, SigningAlgorithm,
};
pub use error::ProtectionError;
use jws::{SignedToken, UNDERSTOOD_CRITICAL};

/// Content type of protected request and response bodies.
pub const PROTECTED_CONTENT_TYPE: &str = "application/jose+json";

/// Default lifetime of an outgoing signed token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Clock skew tolerance (in seconds) when checking token expiry.
pub const CLOCK_SKEW_LEEWAY: i64 = 60;

/// A compact encrypted token ready to be sent as a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedToken(pub(crate) String);

impl ProtectedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProtectedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProtectedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Signs and encrypts outgoing payloads, decrypts and verifies incoming ones.
///
/// Stateless per call and cheap to clone; the key store is shared.
#[derive(Debug, Clone)]
pub struct PayloadProtector {
    keys: Arc<KeyStore>,
    algorithms: AlgorithmSuite,
    token_ttl: Duration,
}

impl PayloadProtector {
    pub fn new(keys: Arc<KeyStore>, algorithms: AlgorithmSuite) -> Self {
        Self {
            keys,
            algorithms,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    pub fn algorithms(&self) -> &AlgorithmSuite {
        &self.algorithms
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Sign `payload` with the own signing key, then encrypt the signed token
    /// for the peer.
    pub fn protect(&self, payload: &Value) -> Result<ProtectedToken, ProtectionError> {
        self.protect_at(payload, chrono::Utc::now().timestamp())
    }

    fn protect_at(&self, payload: &Value, now: i64) -> Result<ProtectedToken, ProtectionError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ProtectionError::MalformedToken(format!("payload serialization: {e}")))?;
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl);

        let signed = zeroize::Zeroizing::new(jws::sign(
            &body,
            self.algorithms.signing,
            self.keys.signing_key(),
            Some(expires_at),
        )?);

        jwe::encrypt(
            signed.as_bytes(),
            self.algorithms.key_management,
            self.algorithms.content_encryption,
            self.keys.peer_encryption_key(),
        )
    }

    /// Decrypt `token` with the own decryption key and verify the inner
    /// signature against the peer verification keys.
    pub fn unprotect(&self, token: &str) -> Result<Value, ProtectionError> {
        self.unprotect_at(token, chrono::Utc::now().timestamp())
    }

    fn unprotect_at(&self, token: &str, now: i64) -> Result<Value, ProtectionError> {
        let plaintext = jwe::decrypt(token, &self.algorithms, self.keys.decryption_key())?;
        let inner = std::str::from_utf8(&plaintext).map_err(|_| {
            ProtectionError::MalformedToken("decrypted content is not a signed token".to_string())
        })?;

        let signed = SignedToken::parse(inner)?;
        let algorithm = self.algorithms.accept_signing(&signed.header.alg)?;
        let key = self
            .keys
            .verification_key(signed.header.kid.as_deref())
            .ok_or_else(|| {
                ProtectionError::SignatureInvalid(match signed.header.kid.as_deref() {
                    Some(kid) => format!("no verification key with kid {kid}"),
                    None => "token names no kid and several verification keys are loaded"
                        .to_string(),
                })
            })?;
        signed.verify(algorithm, key.public_key())?;

        if let Some(unknown) = signed
            .header
            .crit
            .iter()
            .find(|name| !UNDERSTOOD_CRITICAL.contains(&name.as_str()))
        {
            return Err(ProtectionError::MalformedToken(format!(
                "unsupported critical header parameter {unknown}"
            )));
        }
        if signed.header.crit.iter().any(|name| name == "exp") && signed.header.exp.is_none() {
            return Err(ProtectionError::MalformedToken(
                "critical header parameter exp is missing".to_string(),
            ));
        }
        if let Some(expired_at) = signed.header.exp {
            if expired_at.saturating_add(CLOCK_SKEW_LEEWAY) < now {
                debug!(expired_at, now, "Rejecting expired signed token");
                return Err(ProtectionError::Expired { expired_at });
            }
        }

        serde_json::from_slice(&signed.payload)
            .map_err(|e| ProtectionError::MalformedToken(format!("payload is not JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyMaterial, KeyRole};
    use crate::test_support;
    use serde_json::json;

    fn client() -> PayloadProtector {
        PayloadProtector::new(
            Arc::new(test_support::client_keystore()),
            AlgorithmSuite::default(),
        )
    }

    fn server() -> PayloadProtector {
        PayloadProtector::new(
            Arc::new(test_support::server_keystore()),
            AlgorithmSuite::default(),
        )
    }

    fn sample_payment() -> Value {
        json!({
            "amount": "20.00",
            "currency": "USD",
            "destinationToken": "trm-9f1c",
            "clientPaymentId": "pay-0001",
            "purpose": "OTHER",
            "memo": "naïve café ☕"
        })
    }

    #[test]
    fn client_to_server_round_trip() {
        let token = client().protect(&sample_payment()).unwrap();
        assert_eq!(token.as_str().split('.').count(), 5);
        assert_eq!(server().unprotect(token.as_str()).unwrap(), sample_payment());
    }

    #[test]
    fn server_to_client_round_trip() {
        let payloads = [json!(null), json!([]), json!({"nested": {"list": [1, 2.5, "x"]}})];
        for payload in payloads {
            let token = server().protect(&payload).unwrap();
            assert_eq!(client().unprotect(token.as_str()).unwrap(), payload);
        }
    }

    #[test]
    fn each_token_is_fresh() {
        let a = client().protect(&sample_payment()).unwrap();
        let b = client().protect(&sample_payment()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_addressed_to_someone_else_fails_unwrap() {
        // encrypted for the server, opened by the client
        let token = client().protect(&sample_payment()).unwrap();
        assert_eq!(
            client().unprotect(token.as_str()).unwrap_err(),
            ProtectionError::KeyUnwrapFailed
        );
    }

    #[test]
    fn inner_token_signed_by_rogue_key_is_rejected() {
        let client_store = test_support::client_keystore();
        let server_store = test_support::server_keystore();

        // Same kid as the genuine signer, different private key.
        let rogue = KeyMaterial::from_private(
            KeyRole::Signing,
            test_support::rogue_private_key(),
            Some(client_store.signing_key().key_id().to_string()),
        );
        let inner = jws::sign(
            br#"{"amount":"9999.00"}"#,
            SigningAlgorithm::Rs256,
            &rogue,
            Some(chrono::Utc::now().timestamp() + 300),
        )
        .unwrap();
        let suite = AlgorithmSuite::default();
        let token = jwe::encrypt(
            inner.as_bytes(),
            suite.key_management,
            suite.content_encryption,
            client_store.peer_encryption_key(),
        )
        .unwrap();

        let protector = PayloadProtector::new(Arc::new(server_store), suite);
        assert!(matches!(
            protector.unprotect(token.as_str()),
            Err(ProtectionError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn unknown_verification_kid_is_rejected() {
        let client_store = test_support::client_keystore();
        let stranger = KeyMaterial::from_private(
            KeyRole::Signing,
            test_support::rogue_private_key(),
            Some("someone-else".to_string()),
        );
        let inner = jws::sign(b"{}", SigningAlgorithm::Rs256, &stranger, None).unwrap();
        let suite = AlgorithmSuite::default();
        let token = jwe::encrypt(
            inner.as_bytes(),
            suite.key_management,
            suite.content_encryption,
            client_store.peer_encryption_key(),
        )
        .unwrap();

        let err = server().unprotect(token.as_str()).unwrap_err();
        assert!(matches!(err, ProtectionError::SignatureInvalid(ref m) if m.contains("someone-else")));
    }

    #[test]
    fn signing_algorithm_outside_allow_list_is_rejected() {
        let ps256_client = PayloadProtector::new(
            Arc::new(test_support::client_keystore()),
            AlgorithmSuite {
                signing: SigningAlgorithm::Ps256,
                ..AlgorithmSuite::default()
            },
        );
        let token = ps256_client.protect(&sample_payment()).unwrap();

        assert!(matches!(
            server().unprotect(token.as_str()),
            Err(ProtectionError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn content_encryption_outside_allow_list_is_rejected() {
        let a128_client = PayloadProtector::new(
            Arc::new(test_support::client_keystore()),
            AlgorithmSuite {
                content_encryption: ContentEncryptionAlgorithm::A128Gcm,
                ..AlgorithmSuite::default()
            },
        );
        let token = a128_client.protect(&sample_payment()).unwrap();

        assert!(matches!(
            server().unprotect(token.as_str()),
            Err(ProtectionError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn unregistered_header_algorithm_is_rejected() {
        use base64ct::{Base64UrlUnpadded, Encoding};

        let token = client().protect(&sample_payment()).unwrap();
        let mut segments: Vec<String> = token.as_str().split('.').map(str::to_string).collect();
        segments[0] = Base64UrlUnpadded::encode_string(br#"{"alg":"dir","enc":"A256GCM"}"#);
        let forged = segments.join(".");

        assert_eq!(
            server().unprotect(&forged).unwrap_err(),
            ProtectionError::UnsupportedAlgorithm("dir".to_string())
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = chrono::Utc::now().timestamp();
        let client = client().with_token_ttl(Duration::from_secs(30));
        let token = client.protect_at(&sample_payment(), now).unwrap();

        // inside the leeway
        assert!(server().unprotect_at(token.as_str(), now + 30 + CLOCK_SKEW_LEEWAY).is_ok());

        let err = server()
            .unprotect_at(token.as_str(), now + 31 + CLOCK_SKEW_LEEWAY)
            .unwrap_err();
        assert_eq!(err, ProtectionError::Expired { expired_at: now + 30 });
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            server().unprotect(r#"{"not":"a token"}"#),
            Err(ProtectionError::MalformedToken(_))
        ));
    }
}
