// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.
//!
//! RSA key generation is slow, so each test key is generated once per test
//! binary and cloned out.

use std::sync::OnceLock;

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};

use crate::keys::{KeyMaterial, KeyRole, KeyStore};
use crate::protection::AlgorithmSuite;

fn cached(cell: &'static OnceLock<RsaPrivateKey>) -> RsaPrivateKey {
    cell.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key"))
        .clone()
}

pub fn client_private_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    cached(&KEY)
}

pub fn server_private_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    cached(&KEY)
}

pub fn rogue_private_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    cached(&KEY)
}

pub fn private_pem(key: &RsaPrivateKey) -> String {
    key.to_pkcs8_pem(LineEnding::LF)
        .expect("encode private key")
        .to_string()
}

pub fn public_pem(key: &RsaPrivateKey) -> String {
    RsaPublicKey::from(key)
        .to_public_key_pem(LineEnding::LF)
        .expect("encode public key")
}

pub fn private_der(key: &RsaPrivateKey) -> Vec<u8> {
    key.to_pkcs8_der()
        .expect("encode private key")
        .as_bytes()
        .to_vec()
}

fn b64(value: &rsa::BigUint) -> String {
    Base64UrlUnpadded::encode_string(&value.to_bytes_be())
}

pub fn public_jwk(key: &RsaPrivateKey, kid: &str, key_use: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": key_use,
        "n": b64(key.n()),
        "e": b64(key.e()),
    })
}

pub fn private_jwk(key: &RsaPrivateKey, kid: &str, key_use: &str) -> Value {
    let primes = key.primes();
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": key_use,
        "n": b64(key.n()),
        "e": b64(key.e()),
        "d": b64(key.d()),
        "p": b64(&primes[0]),
        "q": b64(&primes[1]),
    })
}

fn keystore(own: RsaPrivateKey, peer: RsaPrivateKey) -> KeyStore {
    let peer = RsaPublicKey::from(&peer);
    KeyStore::from_materials(
        KeyMaterial::from_private(KeyRole::Signing, own.clone(), None),
        KeyMaterial::from_private(KeyRole::Decryption, own, None),
        KeyMaterial::from_public(KeyRole::PeerEncryption, peer.clone(), None),
        vec![KeyMaterial::from_public(KeyRole::PeerVerification, peer, None)],
        &AlgorithmSuite::default(),
    )
    .expect("build test key store")
}

/// Keys as the API client holds them.
pub fn client_keystore() -> KeyStore {
    keystore(client_private_key(), server_private_key())
}

/// Keys as the remote API holds them.
pub fn server_keystore() -> KeyStore {
    keystore(server_private_key(), client_private_key())
}
