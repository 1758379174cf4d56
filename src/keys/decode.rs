// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decoding of PEM, JWK / JWK set and DER key documents into RSA keys.
//!
//! Non-RSA material (EC PEM blocks, `kty: "EC"` JWKs) is rejected here so the
//! client never starts with a key its algorithms cannot use.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;

use super::error::KeyLoadError;
use super::material::KeyRole;

/// One key found in a key document.
#[derive(Debug)]
pub(crate) struct DecodedKey {
    pub key_id: Option<String>,
    pub key_use: Option<String>,
    pub public: RsaPublicKey,
    pub private: Option<RsaPrivateKey>,
}

impl DecodedKey {
    fn from_private(private: RsaPrivateKey) -> Self {
        Self {
            key_id: None,
            key_use: None,
            public: RsaPublicKey::from(&private),
            private: Some(private),
        }
    }

    fn from_public(public: RsaPublicKey) -> Self {
        Self {
            key_id: None,
            key_use: None,
            public,
            private: None,
        }
    }
}

/// Decode every RSA key in `bytes`.
pub(crate) fn decode_keys(bytes: &[u8], role: KeyRole) -> Result<Vec<DecodedKey>, KeyLoadError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let text = text.trim();
        if text.starts_with('{') {
            return decode_jwk_document(text, role);
        }
        if text.contains("-----BEGIN") {
            return decode_pem(text, role).map(|key| vec![key]);
        }
    }
    decode_der(bytes, role).map(|key| vec![key])
}

fn decode_pem(text: &str, role: KeyRole) -> Result<DecodedKey, KeyLoadError> {
    let block = pem::parse(text)
        .map_err(|e| KeyLoadError::incompatible(role, format!("invalid PEM: {e}")))?;
    let der = block.contents();

    match block.tag() {
        "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_der(der)
            .map(DecodedKey::from_private)
            .map_err(|e| KeyLoadError::incompatible(role, format!("not an RSA PKCS#8 key: {e}"))),
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(der)
            .map(DecodedKey::from_private)
            .map_err(|e| KeyLoadError::incompatible(role, format!("invalid PKCS#1 key: {e}"))),
        "PUBLIC KEY" => RsaPublicKey::from_public_key_der(der)
            .map(DecodedKey::from_public)
            .map_err(|e| KeyLoadError::incompatible(role, format!("not an RSA public key: {e}"))),
        "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_der(der)
            .map(DecodedKey::from_public)
            .map_err(|e| {
                KeyLoadError::incompatible(role, format!("invalid PKCS#1 public key: {e}"))
            }),
        other => Err(KeyLoadError::incompatible(
            role,
            format!("unsupported PEM block `{other}` (RSA keys only)"),
        )),
    }
}

fn decode_der(der: &[u8], role: KeyRole) -> Result<DecodedKey, KeyLoadError> {
    if let Ok(private) = RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(DecodedKey::from_private(private));
    }
    if let Ok(private) = RsaPrivateKey::from_pkcs1_der(der) {
        return Ok(DecodedKey::from_private(private));
    }
    if let Ok(public) = RsaPublicKey::from_public_key_der(der) {
        return Ok(DecodedKey::from_public(public));
    }
    if let Ok(public) = RsaPublicKey::from_pkcs1_der(der) {
        return Ok(DecodedKey::from_public(public));
    }
    Err(KeyLoadError::incompatible(
        role,
        "key is neither PEM, JWK nor RSA DER",
    ))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JwkDocument {
    Set { keys: Vec<Jwk> },
    Single(Jwk),
}

#[derive(Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    d: Option<String>,
    #[serde(default)]
    p: Option<String>,
    #[serde(default)]
    q: Option<String>,
}

fn decode_jwk_document(text: &str, role: KeyRole) -> Result<Vec<DecodedKey>, KeyLoadError> {
    let document: JwkDocument = serde_json::from_str(text)
        .map_err(|e| KeyLoadError::incompatible(role, format!("invalid JWK: {e}")))?;

    match document {
        JwkDocument::Single(jwk) => Ok(vec![decode_jwk(jwk, role)?]),
        JwkDocument::Set { keys } => {
            let mut other_types = Vec::new();
            let mut decoded = Vec::new();
            for jwk in keys {
                if jwk.kty == "RSA" {
                    decoded.push(decode_jwk(jwk, role)?);
                } else {
                    tracing::debug!(%role, kty = %jwk.kty, "skipping non-RSA key in JWK set");
                    other_types.push(jwk.kty);
                }
            }
            if decoded.is_empty() && !other_types.is_empty() {
                return Err(KeyLoadError::incompatible(
                    role,
                    format!("JWK set holds no RSA keys (found {})", other_types.join(", ")),
                ));
            }
            Ok(decoded)
        }
    }
}

fn decode_jwk(jwk: Jwk, role: KeyRole) -> Result<DecodedKey, KeyLoadError> {
    if jwk.kty != "RSA" {
        return Err(KeyLoadError::incompatible(
            role,
            format!("unsupported JWK key type `{}` (RSA keys only)", jwk.kty),
        ));
    }

    let n = jwk_component(jwk.n.as_deref(), "n", role)?;
    let e = jwk_component(jwk.e.as_deref(), "e", role)?;

    let (public, private) = match jwk.d.as_deref() {
        Some(d) => {
            let d = jwk_component(Some(d), "d", role)?;
            let p = jwk_component(jwk.p.as_deref(), "p", role)?;
            let q = jwk_component(jwk.q.as_deref(), "q", role)?;
            let mut private = RsaPrivateKey::from_components(n, e, d, vec![p, q])
                .map_err(|e| KeyLoadError::incompatible(role, format!("invalid RSA JWK: {e}")))?;
            private
                .validate()
                .map_err(|e| KeyLoadError::incompatible(role, format!("invalid RSA JWK: {e}")))?;
            private
                .precompute()
                .map_err(|e| KeyLoadError::incompatible(role, format!("invalid RSA JWK: {e}")))?;
            (RsaPublicKey::from(&private), Some(private))
        }
        None => {
            let public = RsaPublicKey::new(n, e)
                .map_err(|e| KeyLoadError::incompatible(role, format!("invalid RSA JWK: {e}")))?;
            (public, None)
        }
    };

    Ok(DecodedKey {
        key_id: jwk.kid,
        key_use: jwk.key_use,
        public,
        private,
    })
}

fn jwk_component(value: Option<&str>, name: &str, role: KeyRole) -> Result<BigUint, KeyLoadError> {
    let value = value.ok_or_else(|| {
        KeyLoadError::incompatible(role, format!("RSA JWK is missing `{name}`"))
    })?;
    let bytes = Base64UrlUnpadded::decode_vec(value).map_err(|_| {
        KeyLoadError::incompatible(role, format!("RSA JWK member `{name}` is not base64url"))
    })?;
    Ok(BigUint::from_bytes_be(&bytes))
}
