// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-tagged key material.

use std::fmt;

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// Which side owns a key and what it is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Client private key signing outgoing payloads.
    Signing,
    /// Client private key decrypting incoming payloads.
    Decryption,
    /// Server public key encrypting outgoing payloads.
    PeerEncryption,
    /// Server public key(s) verifying incoming payloads.
    PeerVerification,
}

impl KeyRole {
    pub const ALL: [KeyRole; 4] = [
        KeyRole::Signing,
        KeyRole::Decryption,
        KeyRole::PeerEncryption,
        KeyRole::PeerVerification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyRole::Signing => "own-signing",
            KeyRole::Decryption => "own-encryption",
            KeyRole::PeerEncryption => "peer-encryption",
            KeyRole::PeerVerification => "peer-verification",
        }
    }

    /// Whether the client must hold the private half for this role.
    pub fn requires_private(self) -> bool {
        matches!(self, KeyRole::Signing | KeyRole::Decryption)
    }

    /// JWK `use` value matching this role.
    pub fn jwk_use(self) -> &'static str {
        match self {
            KeyRole::Signing | KeyRole::PeerVerification => "sig",
            KeyRole::Decryption | KeyRole::PeerEncryption => "enc",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asymmetric key family. Only RSA is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
}

/// A loaded key with its role and identifier.
///
/// Immutable once built. The public half is always present; the private half
/// only for roles that need it.
#[derive(Clone)]
pub struct KeyMaterial {
    role: KeyRole,
    key_id: String,
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl KeyMaterial {
    /// Build material from a private key. The key id defaults to the JWK thumbprint.
    pub fn from_private(role: KeyRole, private: RsaPrivateKey, key_id: Option<String>) -> Self {
        let public = RsaPublicKey::from(&private);
        Self::build(role, public, Some(private), key_id)
    }

    /// Build material from a public key. The key id defaults to the JWK thumbprint.
    pub fn from_public(role: KeyRole, public: RsaPublicKey, key_id: Option<String>) -> Self {
        Self::build(role, public, None, key_id)
    }

    fn build(
        role: KeyRole,
        public: RsaPublicKey,
        private: Option<RsaPrivateKey>,
        key_id: Option<String>,
    ) -> Self {
        let key_id = key_id.unwrap_or_else(|| jwk_thumbprint(&public));
        Self {
            role,
            key_id,
            public,
            private,
        }
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Rsa
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.n().bits()
    }

    pub fn is_private(&self) -> bool {
        self.private.is_some()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub(crate) fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private.as_ref()
    }

    /// Drop the private half (peer roles never keep one).
    pub(crate) fn into_public(self) -> Self {
        Self {
            private: None,
            ..self
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("role", &self.role)
            .field("key_id", &self.key_id)
            .field("bits", &self.bits())
            .field("private", &self.is_private())
            .finish()
    }
}

/// RFC 7638 thumbprint of an RSA public key (SHA-256, base64url).
pub fn jwk_thumbprint(public: &RsaPublicKey) -> String {
    // Members in lexicographic order, no whitespace.
    let canonical = format!(
        r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
        Base64UrlUnpadded::encode_string(&public.e().to_bytes_be()),
        Base64UrlUnpadded::encode_string(&public.n().to_bytes_be()),
    );
    Base64UrlUnpadded::encode_string(&Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn thumbprint_is_stable_and_shared_by_both_halves() {
        let private = test_support::client_private_key();
        let from_private = KeyMaterial::from_private(KeyRole::Signing, private.clone(), None);
        let from_public =
            KeyMaterial::from_public(KeyRole::PeerVerification, RsaPublicKey::from(&private), None);
        assert_eq!(from_private.key_id(), from_public.key_id());
        // SHA-256 digest is 32 bytes -> 43 base64url characters.
        assert_eq!(from_private.key_id().len(), 43);
    }

    #[test]
    fn configured_key_id_wins() {
        let material = KeyMaterial::from_private(
            KeyRole::Signing,
            test_support::client_private_key(),
            Some("client-sig-1".to_string()),
        );
        assert_eq!(material.key_id(), "client-sig-1");
        assert_eq!(material.bits(), 2048);
        assert_eq!(material.algorithm(), KeyAlgorithm::Rsa);
    }

    #[test]
    fn debug_output_never_contains_key_bytes() {
        let material =
            KeyMaterial::from_private(KeyRole::Decryption, test_support::client_private_key(), None);
        let rendered = format!("{material:?}");
        assert!(rendered.contains("private: true"));
        assert!(!rendered.contains("RsaPrivateKey"));
    }

    #[test]
    fn into_public_drops_private_half() {
        let material =
            KeyMaterial::from_private(KeyRole::PeerEncryption, test_support::server_private_key(), None);
        let public = material.clone().into_public();
        assert!(!public.is_private());
        assert_eq!(public.key_id(), material.key_id());
    }

    #[test]
    fn roles_map_to_jwk_use() {
        assert_eq!(KeyRole::Signing.jwk_use(), "sig");
        assert_eq!(KeyRole::PeerEncryption.jwk_use(), "enc");
        assert!(KeyRole::Decryption.requires_private());
        assert!(!KeyRole::PeerVerification.requires_private());
        assert_eq!(KeyRole::PeerVerification.to_string(), "peer-verification");
    }
}
