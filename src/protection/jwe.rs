// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact encrypted token
//! (`header.encrypted_key.iv.ciphertext.tag`), the outer layer.
//!
//! The content-encryption key is fresh for every message and travels wrapped
//! under the recipient's RSA key. The encoded protected header is the AES-GCM
//! additional authenticated data, so header tampering fails the tag check.

use aes_gcm::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::rand_core::{OsRng, RngCore};
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::algorithms::{AlgorithmSuite, ContentEncryptionAlgorithm, KeyManagementAlgorithm};
use super::error::ProtectionError;
use super::jws::decode_segment;
use super::ProtectedToken;
use crate::keys::KeyMaterial;

/// GCM nonce length in bytes.
const IV_LEN: usize = 12;
/// GCM tag length in bytes.
const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EncryptionHeader {
    pub alg: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crit: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// Encrypt `plaintext` for `recipient`.
pub(crate) fn encrypt(
    plaintext: &[u8],
    key_management: KeyManagementAlgorithm,
    content_encryption: ContentEncryptionAlgorithm,
    recipient: &KeyMaterial,
) -> Result<ProtectedToken, ProtectionError> {
    let header = EncryptionHeader {
        alg: key_management.identifier().to_string(),
        enc: content_encryption.identifier().to_string(),
        kid: Some(recipient.key_id().to_string()),
        cty: Some("JWT".to_string()),
        crit: Vec::new(),
        zip: None,
    };
    let header = serde_json::to_vec(&header)
        .map_err(|e| ProtectionError::MalformedToken(format!("header serialization: {e}")))?;
    let encoded_header = Base64UrlUnpadded::encode_string(&header);

    let mut cek = Zeroizing::new(vec![0u8; content_encryption.key_len()]);
    OsRng.fill_bytes(&mut cek);

    let encrypted_key = match key_management {
        KeyManagementAlgorithm::RsaOaep256 => recipient
            .public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &cek)
            .map_err(|e| ProtectionError::KeyMismatch {
                algorithm: key_management.identifier().to_string(),
                reason: e.to_string(),
            })?,
    };

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let mut buffer = plaintext.to_vec();
    let tag = match content_encryption {
        ContentEncryptionAlgorithm::A256Gcm => {
            seal::<Aes256Gcm>(&cek, &iv, encoded_header.as_bytes(), &mut buffer)?
        }
        ContentEncryptionAlgorithm::A128Gcm => {
            seal::<Aes128Gcm>(&cek, &iv, encoded_header.as_bytes(), &mut buffer)?
        }
    };

    Ok(ProtectedToken(format!(
        "{encoded_header}.{}.{}.{}.{}",
        Base64UrlUnpadded::encode_string(&encrypted_key),
        Base64UrlUnpadded::encode_string(&iv),
        Base64UrlUnpadded::encode_string(&buffer),
        Base64UrlUnpadded::encode_string(&tag),
    )))
}

/// Decrypt `token` addressed to `recipient`, returning the inner plaintext.
///
/// Header algorithms must match `suite`. No plaintext leaves this function
/// unless the authentication tag verified.
pub(crate) fn decrypt(
    token: &str,
    suite: &AlgorithmSuite,
    recipient: &KeyMaterial,
) -> Result<Zeroizing<Vec<u8>>, ProtectionError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 5 {
        return Err(ProtectionError::MalformedToken(format!(
            "encrypted token has {} segments, expected 5",
            segments.len()
        )));
    }

    let header_bytes = decode_segment(segments[0], "encryption header")?;
    let header: EncryptionHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        ProtectionError::MalformedToken(format!("invalid encryption header: {e}"))
    })?;
    // No extension parameters are understood on the outer header.
    if let Some(name) = header.crit.first() {
        return Err(ProtectionError::MalformedToken(format!(
            "unsupported critical encryption header parameter `{name}`"
        )));
    }
    if let Some(zip) = &header.zip {
        return Err(ProtectionError::MalformedToken(format!(
            "unsupported compression `{zip}`"
        )));
    }
    let key_management = suite.accept_key_management(&header.alg)?;
    let content_encryption = suite.accept_content_encryption(&header.enc)?;

    let encrypted_key = decode_segment(segments[1], "encrypted key")?;
    let iv = decode_segment(segments[2], "initialization vector")?;
    let ciphertext = decode_segment(segments[3], "ciphertext")?;
    let tag = decode_segment(segments[4], "authentication tag")?;
    if iv.len() != IV_LEN {
        return Err(ProtectionError::MalformedToken(format!(
            "initialization vector is {} bytes, expected {IV_LEN}",
            iv.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(ProtectionError::MalformedToken(format!(
            "authentication tag is {} bytes, expected {TAG_LEN}",
            tag.len()
        )));
    }

    if let Some(kid) = header.kid.as_deref() {
        if kid != recipient.key_id() {
            tracing::debug!(
                token_kid = %kid,
                local_kid = %recipient.key_id(),
                "encrypted token names a different recipient key"
            );
        }
    }

    let private = recipient
        .private_key()
        .ok_or_else(|| ProtectionError::KeyMismatch {
            algorithm: key_management.identifier().to_string(),
            reason: format!("{} key has no private half", recipient.role()),
        })?;

    // Every unwrap failure looks the same to the caller.
    let cek = match key_management {
        KeyManagementAlgorithm::RsaOaep256 => private
            .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
            .map(Zeroizing::new)
            .map_err(|_| ProtectionError::KeyUnwrapFailed)?,
    };
    if cek.len() != content_encryption.key_len() {
        return Err(ProtectionError::KeyUnwrapFailed);
    }

    let mut buffer = Zeroizing::new(ciphertext);
    let aad = segments[0].as_bytes();
    match content_encryption {
        ContentEncryptionAlgorithm::A256Gcm => {
            open::<Aes256Gcm>(&cek, &iv, aad, &mut buffer, &tag)?
        }
        ContentEncryptionAlgorithm::A128Gcm => {
            open::<Aes128Gcm>(&cek, &iv, aad, &mut buffer, &tag)?
        }
    }
    Ok(buffer)
}

fn seal<C: KeyInit + AeadInPlace>(
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    buffer: &mut Vec<u8>,
) -> Result<Vec<u8>, ProtectionError> {
    let cipher = C::new_from_slice(cek).map_err(|_| ProtectionError::KeyMismatch {
        algorithm: "AES-GCM".to_string(),
        reason: "content key has the wrong length".to_string(),
    })?;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<C>::from_slice(iv), aad, buffer)
        .map_err(|_| ProtectionError::MalformedToken("payload too large to encrypt".to_string()))?;
    Ok(tag.to_vec())
}

fn open<C: KeyInit + AeadInPlace>(
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    buffer: &mut Vec<u8>,
    tag: &[u8],
) -> Result<(), ProtectionError> {
    let cipher = C::new_from_slice(cek).map_err(|_| ProtectionError::KeyUnwrapFailed)?;
    cipher
        .decrypt_in_place_detached(
            Nonce::<C>::from_slice(iv),
            aad,
            buffer,
            Tag::<C>::from_slice(tag),
        )
        .map_err(|_| {
            buffer.clear();
            ProtectionError::AuthenticationFailed
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyRole;
    use crate::test_support;

    fn recipient() -> KeyMaterial {
        KeyMaterial::from_private(KeyRole::Decryption, test_support::client_private_key(), None)
    }

    fn flip_byte(token: &str, segment: usize, index: usize) -> String {
        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut bytes = Base64UrlUnpadded::decode_vec(&segments[segment]).unwrap();
        bytes[index] ^= 0x01;
        segments[segment] = Base64UrlUnpadded::encode_string(&bytes);
        segments.join(".")
    }

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let token = encrypt(
            b"inner.signed.token",
            suite.key_management,
            suite.content_encryption,
            &recipient.clone().into_public(),
        )
        .unwrap();

        assert_eq!(token.as_str().split('.').count(), 5);
        let plaintext = decrypt(token.as_str(), &suite, &recipient).unwrap();
        assert_eq!(plaintext.as_slice(), b"inner.signed.token");
    }

    #[test]
    fn a128gcm_round_trip() {
        let recipient = recipient();
        let suite = AlgorithmSuite {
            content_encryption: ContentEncryptionAlgorithm::A128Gcm,
            ..AlgorithmSuite::default()
        };
        let token = encrypt(
            b"payload",
            suite.key_management,
            suite.content_encryption,
            &recipient,
        )
        .unwrap();
        assert_eq!(decrypt(token.as_str(), &suite, &recipient).unwrap().as_slice(), b"payload");
    }

    #[test]
    fn every_ciphertext_and_tag_byte_is_authenticated() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let plaintext = b"0123456789abcdef";
        let token = encrypt(plaintext, suite.key_management, suite.content_encryption, &recipient)
            .unwrap();

        for index in 0..plaintext.len() {
            let tampered = flip_byte(token.as_str(), 3, index);
            assert_eq!(
                decrypt(&tampered, &suite, &recipient).unwrap_err(),
                ProtectionError::AuthenticationFailed,
                "ciphertext byte {index}"
            );
        }
        for index in 0..TAG_LEN {
            let tampered = flip_byte(token.as_str(), 4, index);
            assert_eq!(
                decrypt(&tampered, &suite, &recipient).unwrap_err(),
                ProtectionError::AuthenticationFailed,
                "tag byte {index}"
            );
        }
    }

    #[test]
    fn altered_tag_characters_fail_closed() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let token =
            encrypt(b"x", suite.key_management, suite.content_encryption, &recipient).unwrap();
        let segments: Vec<&str> = token.as_str().split('.').collect();

        let mut authentication_failures = 0;
        for index in 0..segments[4].len() {
            let mut tag = segments[4].as_bytes().to_vec();
            tag[index] ^= 0x01;
            let tag = String::from_utf8(tag).unwrap();
            let mut tampered = segments.clone();
            tampered[4] = &tag;

            match decrypt(&tampered.join("."), &suite, &recipient) {
                Err(ProtectionError::AuthenticationFailed) => authentication_failures += 1,
                // Non-canonical trailing bits are rejected by the decoder.
                Err(ProtectionError::MalformedToken(_)) => {}
                other => panic!("tag character {index}: {other:?}"),
            }
        }
        assert!(authentication_failures > 0);
    }

    #[test]
    fn critical_outer_header_parameters_are_rejected() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let token =
            encrypt(b"x", suite.key_management, suite.content_encryption, &recipient).unwrap();
        let mut segments: Vec<String> = token.as_str().split('.').map(str::to_string).collect();

        for header in [
            r#"{"alg":"RSA-OAEP-256","enc":"A256GCM","crit":["zip"],"zip":"DEF"}"#,
            r#"{"alg":"RSA-OAEP-256","enc":"A256GCM","crit":["x-ext"],"x-ext":1}"#,
            r#"{"alg":"RSA-OAEP-256","enc":"A256GCM","zip":"DEF"}"#,
        ] {
            segments[0] = Base64UrlUnpadded::encode_string(header.as_bytes());
            assert!(
                matches!(
                    decrypt(&segments.join("."), &suite, &recipient),
                    Err(ProtectionError::MalformedToken(_))
                ),
                "{header}"
            );
        }
    }

    #[test]
    fn altered_iv_fails_authentication() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let token =
            encrypt(b"x", suite.key_management, suite.content_encryption, &recipient).unwrap();
        let tampered = flip_byte(token.as_str(), 2, 0);
        assert_eq!(
            decrypt(&tampered, &suite, &recipient).unwrap_err(),
            ProtectionError::AuthenticationFailed
        );
    }

    #[test]
    fn altered_encrypted_key_fails_unwrap() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let token =
            encrypt(b"x", suite.key_management, suite.content_encryption, &recipient).unwrap();
        let tampered = flip_byte(token.as_str(), 1, 10);
        assert_eq!(
            decrypt(&tampered, &suite, &recipient).unwrap_err(),
            ProtectionError::KeyUnwrapFailed
        );
    }

    #[test]
    fn wrong_recipient_key_fails_unwrap() {
        let suite = AlgorithmSuite::default();
        let token =
            encrypt(b"x", suite.key_management, suite.content_encryption, &recipient()).unwrap();
        let other =
            KeyMaterial::from_private(KeyRole::Decryption, test_support::server_private_key(), None);
        assert_eq!(
            decrypt(token.as_str(), &suite, &other).unwrap_err(),
            ProtectionError::KeyUnwrapFailed
        );
    }

    #[test]
    fn structural_damage_is_malformed() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        for token in ["", "a.b.c", "a.b.c.d.e.f", "!!.e30.e30.e30.e30"] {
            assert!(
                matches!(
                    decrypt(token, &suite, &recipient),
                    Err(ProtectionError::MalformedToken(_))
                ),
                "{token:?}"
            );
        }
    }

    #[test]
    fn short_iv_is_malformed() {
        let recipient = recipient();
        let suite = AlgorithmSuite::default();
        let token =
            encrypt(b"x", suite.key_management, suite.content_encryption, &recipient).unwrap();
        let mut segments: Vec<&str> = token.as_str().split('.').collect();
        segments[2] = "AAAA";
        let damaged = segments.join(".");
        assert!(matches!(
            decrypt(&damaged, &suite, &recipient),
            Err(ProtectionError::MalformedToken(_))
        ));
    }
}
