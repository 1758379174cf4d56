// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact signed token (`header.payload.signature`), the inner layer.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::rand_core::OsRng;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{pkcs1v15, pss, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::algorithms::SigningAlgorithm;
use super::error::ProtectionError;
use crate::keys::KeyMaterial;

/// Header parameter names this implementation understands in `crit`.
pub(crate) const UNDERSTOOD_CRITICAL: &[&str] = &["exp"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SignatureHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crit: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Sign `payload` and return the compact token.
pub(crate) fn sign(
    payload: &[u8],
    algorithm: SigningAlgorithm,
    key: &KeyMaterial,
    expires_at: Option<i64>,
) -> Result<String, ProtectionError> {
    let private = key.private_key().ok_or_else(|| ProtectionError::KeyMismatch {
        algorithm: algorithm.identifier().to_string(),
        reason: format!("{} key {} has no private half", key.role(), key.key_id()),
    })?;

    let header = SignatureHeader {
        alg: algorithm.identifier().to_string(),
        kid: Some(key.key_id().to_string()),
        crit: expires_at.map(|_| vec!["exp".to_string()]).unwrap_or_default(),
        exp: expires_at,
    };
    let header = serde_json::to_vec(&header)
        .map_err(|e| ProtectionError::MalformedToken(format!("header serialization: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        Base64UrlUnpadded::encode_string(&header),
        Base64UrlUnpadded::encode_string(payload)
    );

    let signing_error = |e: rsa::signature::Error| ProtectionError::KeyMismatch {
        algorithm: algorithm.identifier().to_string(),
        reason: e.to_string(),
    };
    let signature = match algorithm {
        SigningAlgorithm::Rs256 => pkcs1v15::SigningKey::<Sha256>::new(private.clone())
            .try_sign(signing_input.as_bytes())
            .map_err(signing_error)?
            .to_vec(),
        SigningAlgorithm::Ps256 => pss::SigningKey::<Sha256>::new(private.clone())
            .try_sign_with_rng(&mut OsRng, signing_input.as_bytes())
            .map_err(signing_error)?
            .to_vec(),
    };

    Ok(format!(
        "{signing_input}.{}",
        Base64UrlUnpadded::encode_string(&signature)
    ))
}

/// A parsed but not yet verified signed token.
pub(crate) struct SignedToken<'a> {
    pub header: SignatureHeader,
    signing_input: &'a str,
    pub payload: Vec<u8>,
    signature: Vec<u8>,
}

impl<'a> SignedToken<'a> {
    pub fn parse(token: &'a str) -> Result<Self, ProtectionError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(ProtectionError::MalformedToken(format!(
                "signed token has {} segments, expected 3",
                segments.len()
            )));
        }

        let header_bytes = decode_segment(segments[0], "signature header")?;
        let header: SignatureHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
            ProtectionError::MalformedToken(format!("invalid signature header: {e}"))
        })?;
        let payload = decode_segment(segments[1], "payload")?;
        let signature = decode_segment(segments[2], "signature")?;

        // header.payload, as received
        let signing_input = &token[..segments[0].len() + 1 + segments[1].len()];

        Ok(Self {
            header,
            signing_input,
            payload,
            signature,
        })
    }

    /// Check the signature with `key` under `algorithm`.
    pub fn verify(
        &self,
        algorithm: SigningAlgorithm,
        key: &RsaPublicKey,
    ) -> Result<(), ProtectionError> {
        let message = self.signing_input.as_bytes();
        let result = match algorithm {
            SigningAlgorithm::Rs256 => {
                let signature = pkcs1v15::Signature::try_from(self.signature.as_slice())
                    .map_err(|_| invalid_signature())?;
                pkcs1v15::VerifyingKey::<Sha256>::new(key.clone()).verify(message, &signature)
            }
            SigningAlgorithm::Ps256 => {
                let signature = pss::Signature::try_from(self.signature.as_slice())
                    .map_err(|_| invalid_signature())?;
                pss::VerifyingKey::<Sha256>::new(key.clone()).verify(message, &signature)
            }
        };
        result.map_err(|_| invalid_signature())
    }
}

fn invalid_signature() -> ProtectionError {
    ProtectionError::SignatureInvalid("signature does not match".to_string())
}

pub(crate) fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, ProtectionError> {
    Base64UrlUnpadded::decode_vec(segment)
        .map_err(|_| ProtectionError::MalformedToken(format!("{name} is not valid base64url")))
}
