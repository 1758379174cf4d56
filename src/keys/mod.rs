// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Store
//!
//! Loads and holds the four key materials needed for protected exchange:
//!
//! | Role | Half | Used for |
//! |------|------|----------|
//! | own-signing | private | signing outgoing payloads |
//! | own-encryption | private | unwrapping keys of incoming payloads |
//! | peer-encryption | public | wrapping keys of outgoing payloads |
//! | peer-verification | public (one or more) | verifying incoming payloads |
//!
//! Keys are loaded once, when the client is built, and validated against the
//! configured algorithms right away. The store is immutable afterwards and is
//! shared across concurrent calls without locking.
//!
//! ## Key selection
//!
//! A source may hold a JWK set. A configured `key_id` picks the key with that
//! `kid`; otherwise keys whose `use` matches the role (or carry no `use`) are
//! candidates. Roles that take a single key fail when more than one candidate
//! remains.

mod decode;
pub mod error;
pub mod material;
pub mod source;

pub use error::KeyLoadError;
pub use material::{jwk_thumbprint, KeyAlgorithm, KeyMaterial, KeyRole};
pub use source::{KeySource, KeySourceConfig};

use tracing::{info, warn};

use crate::protection::algorithms::AlgorithmSuite;

use decode::{decode_keys, DecodedKey};

/// Key sources for all four roles.
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    pub signing: KeySourceConfig,
    pub decryption: KeySourceConfig,
    pub peer_encryption: KeySourceConfig,
    pub peer_verification: KeySourceConfig,
}

impl KeyConfig {
    pub fn source(&self, role: KeyRole) -> &KeySourceConfig {
        match role {
            KeyRole::Signing => &self.signing,
            KeyRole::Decryption => &self.decryption,
            KeyRole::PeerEncryption => &self.peer_encryption,
            KeyRole::PeerVerification => &self.peer_verification,
        }
    }

    /// Whether any role has a source set.
    pub fn is_configured(&self) -> bool {
        KeyRole::ALL
            .iter()
            .any(|role| self.source(*role).is_configured())
    }
}

/// Immutable set of loaded keys.
#[derive(Debug, Clone)]
pub struct KeyStore {
    signing: KeyMaterial,
    decryption: KeyMaterial,
    peer_encryption: KeyMaterial,
    peer_verification: Vec<KeyMaterial>,
}

impl KeyStore {
    /// Load every key from `config` and validate it against `algorithms`.
    ///
    /// Reads only the configured sources; never touches the network.
    pub fn load(config: &KeyConfig, algorithms: &AlgorithmSuite) -> Result<Self, KeyLoadError> {
        let signing = load_single(KeyRole::Signing, &config.signing)?;
        let decryption = load_single(KeyRole::Decryption, &config.decryption)?;
        let peer_encryption = load_single(KeyRole::PeerEncryption, &config.peer_encryption)?;
        let peer_verification = load_all(KeyRole::PeerVerification, &config.peer_verification)?;

        let store = Self::from_materials(
            signing,
            decryption,
            peer_encryption,
            peer_verification,
            algorithms,
        )?;

        info!(
            signing_kid = %store.signing.key_id(),
            decryption_kid = %store.decryption.key_id(),
            peer_encryption_kid = %store.peer_encryption.key_id(),
            peer_verification_keys = store.peer_verification.len(),
            "Key store loaded"
        );
        Ok(store)
    }

    /// Assemble a store from already-built materials, applying the same
    /// validation as [`KeyStore::load`].
    pub fn from_materials(
        signing: KeyMaterial,
        decryption: KeyMaterial,
        peer_encryption: KeyMaterial,
        peer_verification: Vec<KeyMaterial>,
        algorithms: &AlgorithmSuite,
    ) -> Result<Self, KeyLoadError> {
        if peer_verification.is_empty() {
            return Err(KeyLoadError::MissingKey {
                role: KeyRole::PeerVerification,
            });
        }

        let signing_bits = algorithms.signing.min_key_bits();
        let wrapping_bits = algorithms.key_management.min_key_bits();

        validate(&signing, KeyRole::Signing, signing_bits, algorithms.signing.identifier())?;
        validate(
            &decryption,
            KeyRole::Decryption,
            wrapping_bits,
            algorithms.key_management.identifier(),
        )?;
        validate(
            &peer_encryption,
            KeyRole::PeerEncryption,
            wrapping_bits,
            algorithms.key_management.identifier(),
        )?;
        for key in &peer_verification {
            validate(
                key,
                KeyRole::PeerVerification,
                signing_bits,
                algorithms.signing.identifier(),
            )?;
        }

        Ok(Self {
            signing,
            decryption,
            peer_encryption,
            peer_verification,
        })
    }

    pub fn signing_key(&self) -> &KeyMaterial {
        &self.signing
    }

    pub fn decryption_key(&self) -> &KeyMaterial {
        &self.decryption
    }

    pub fn peer_encryption_key(&self) -> &KeyMaterial {
        &self.peer_encryption
    }

    pub fn peer_verification_keys(&self) -> &[KeyMaterial] {
        &self.peer_verification
    }

    /// Select the verification key named by a token header.
    ///
    /// A token without `kid` is only accepted when exactly one verification
    /// key is loaded.
    pub fn verification_key(&self, kid: Option<&str>) -> Option<&KeyMaterial> {
        match kid {
            Some(kid) => self.peer_verification.iter().find(|k| k.key_id() == kid),
            None if self.peer_verification.len() == 1 => self.peer_verification.first(),
            None => None,
        }
    }
}

fn validate(
    key: &KeyMaterial,
    slot: KeyRole,
    min_bits: usize,
    algorithm: &str,
) -> Result<(), KeyLoadError> {
    if key.role() != slot {
        return Err(KeyLoadError::incompatible(
            slot,
            format!("material tagged {} given for {slot}", key.role()),
        ));
    }
    if slot.requires_private() && !key.is_private() {
        return Err(KeyLoadError::incompatible(
            slot,
            "a private key is required for this role",
        ));
    }
    if key.bits() < min_bits {
        return Err(KeyLoadError::incompatible(
            slot,
            format!(
                "{algorithm} requires at least {min_bits}-bit keys, got {} bits",
                key.bits()
            ),
        ));
    }
    Ok(())
}

fn candidates(role: KeyRole, source: &KeySourceConfig) -> Result<Vec<DecodedKey>, KeyLoadError> {
    let bytes = source.resolve(role)?.read(role)?;
    let mut keys = decode_keys(&bytes, role)?;

    match source.key_id.as_deref() {
        Some(kid) => {
            // PEM and DER carry no kid of their own; the configured one names them.
            for key in keys.iter_mut().filter(|k| k.key_id.is_none()) {
                key.key_id = Some(kid.to_string());
            }
            keys.retain(|k| k.key_id.as_deref() == Some(kid));
        }
        None => keys.retain(|k| {
            k.key_use
                .as_deref()
                .map_or(true, |key_use| key_use == role.jwk_use())
        }),
    }

    if keys.is_empty() {
        return Err(KeyLoadError::MissingKey { role });
    }
    Ok(keys)
}

fn into_material(role: KeyRole, key: DecodedKey) -> KeyMaterial {
    match key.private {
        Some(private) => {
            let material = KeyMaterial::from_private(role, private, key.key_id);
            if role.requires_private() {
                material
            } else {
                warn!(%role, kid = %material.key_id(), "private key supplied for a peer role; keeping only the public half");
                material.into_public()
            }
        }
        None => KeyMaterial::from_public(role, key.public, key.key_id),
    }
}

fn load_single(role: KeyRole, source: &KeySourceConfig) -> Result<KeyMaterial, KeyLoadError> {
    let mut keys = candidates(role, source)?;
    if keys.len() > 1 {
        return Err(KeyLoadError::AmbiguousSource {
            role,
            reason: format!(
                "{} candidate keys; set a key id to choose one",
                keys.len()
            ),
        });
    }
    Ok(into_material(role, keys.remove(0)))
}

fn load_all(role: KeyRole, source: &KeySourceConfig) -> Result<Vec<KeyMaterial>, KeyLoadError> {
    Ok(candidates(role, source)?
        .into_iter()
        .map(|key| into_material(role, key))
        .collect())
}
