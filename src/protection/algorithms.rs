// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Algorithm Registry
//!
//! Every algorithm the client can sign, wrap keys or encrypt content with is
//! compiled in here and addressed by its JOSE identifier. Nothing is
//! registered at runtime.
//!
//! | Family | Identifier | Primitive |
//! |--------|------------|-----------|
//! | signing | `RS256` | RSASSA-PKCS1-v1_5 with SHA-256 |
//! | signing | `PS256` | RSASSA-PSS with SHA-256 |
//! | key management | `RSA-OAEP-256` | RSAES-OAEP with SHA-256 / MGF1-SHA-256 |
//! | content encryption | `A256GCM` | AES-256-GCM |
//! | content encryption | `A128GCM` | AES-128-GCM |
//!
//! The configured [`AlgorithmSuite`] doubles as the allow-list for incoming
//! tokens: a header naming any other algorithm is rejected even when the
//! algorithm itself is registered.

use std::fmt;
use std::str::FromStr;

use super::error::ProtectionError;

/// Smallest RSA modulus accepted by any registered RSA algorithm.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// A registry family: a closed set of algorithms addressed by identifier.
trait Registered: Copy + 'static {
    const ALL: &'static [Self];

    fn identifier(self) -> &'static str;
}

fn lookup<T: Registered>(identifier: &str) -> Result<T, ProtectionError> {
    T::ALL
        .iter()
        .copied()
        .find(|alg| alg.identifier() == identifier)
        .ok_or_else(|| ProtectionError::UnsupportedAlgorithm(identifier.to_string()))
}

/// Signature algorithm for the inner signed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    Rs256,
    Ps256,
}

impl Registered for SigningAlgorithm {
    const ALL: &'static [Self] = &[Self::Rs256, Self::Ps256];

    fn identifier(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Ps256 => "PS256",
        }
    }
}

impl SigningAlgorithm {
    pub fn identifier(self) -> &'static str {
        Registered::identifier(self)
    }

    pub fn min_key_bits(self) -> usize {
        MIN_RSA_KEY_BITS
    }
}

/// Algorithm wrapping the per-message content-encryption key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyManagementAlgorithm {
    RsaOaep256,
}

impl Registered for KeyManagementAlgorithm {
    const ALL: &'static [Self] = &[Self::RsaOaep256];

    fn identifier(self) -> &'static str {
        match self {
            Self::RsaOaep256 => "RSA-OAEP-256",
        }
    }
}

impl KeyManagementAlgorithm {
    pub fn identifier(self) -> &'static str {
        Registered::identifier(self)
    }

    pub fn min_key_bits(self) -> usize {
        MIN_RSA_KEY_BITS
    }
}

/// Authenticated cipher for the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlgorithm {
    A256Gcm,
    A128Gcm,
}

impl Registered for ContentEncryptionAlgorithm {
    const ALL: &'static [Self] = &[Self::A256Gcm, Self::A128Gcm];

    fn identifier(self) -> &'static str {
        match self {
            Self::A256Gcm => "A256GCM",
            Self::A128Gcm => "A128GCM",
        }
    }
}

impl ContentEncryptionAlgorithm {
    pub fn identifier(self) -> &'static str {
        Registered::identifier(self)
    }

    /// Content-encryption key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::A256Gcm => 32,
            Self::A128Gcm => 16,
        }
    }
}

macro_rules! impl_identifier_traits {
    ($($ty:ty),+) => {
        $(
            impl FromStr for $ty {
                type Err = ProtectionError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    lookup(s.trim())
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.identifier())
                }
            }
        )+
    };
}

impl_identifier_traits!(
    SigningAlgorithm,
    KeyManagementAlgorithm,
    ContentEncryptionAlgorithm
);

/// The algorithm triple used for outgoing tokens and accepted on incoming ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSuite {
    pub signing: SigningAlgorithm,
    pub key_management: KeyManagementAlgorithm,
    pub content_encryption: ContentEncryptionAlgorithm,
}

impl Default for AlgorithmSuite {
    fn default() -> Self {
        Self {
            signing: SigningAlgorithm::Rs256,
            key_management: KeyManagementAlgorithm::RsaOaep256,
            content_encryption: ContentEncryptionAlgorithm::A256Gcm,
        }
    }
}

impl AlgorithmSuite {
    /// Resolve a header-declared signing algorithm against the allow-list.
    pub fn accept_signing(&self, declared: &str) -> Result<SigningAlgorithm, ProtectionError> {
        accept(declared, self.signing)
    }

    /// Resolve a header-declared key-management algorithm against the allow-list.
    pub fn accept_key_management(
        &self,
        declared: &str,
    ) -> Result<KeyManagementAlgorithm, ProtectionError> {
        accept(declared, self.key_management)
    }

    /// Resolve a header-declared content-encryption algorithm against the allow-list.
    pub fn accept_content_encryption(
        &self,
        declared: &str,
    ) -> Result<ContentEncryptionAlgorithm, ProtectionError> {
        accept(declared, self.content_encryption)
    }
}

fn accept<T: Registered + PartialEq>(declared: &str, allowed: T) -> Result<T, ProtectionError> {
    let algorithm: T = lookup(declared)?;
    if algorithm != allowed {
        return Err(ProtectionError::UnsupportedAlgorithm(format!(
            "{declared} is not allowed (expected {})",
            allowed.identifier()
        )));
    }
    Ok(algorithm)
}
