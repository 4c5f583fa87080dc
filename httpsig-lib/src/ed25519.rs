//! Ed25519 signator and verifier
//!
//! The signing string is signed as-is; Ed25519 does its own hashing, so a
//! prehash option is rejected.

use crate::error::{HttpSigError, Result};
use crate::signator::{Signator, SignerOpts, Verifier};
use rand::RngCore;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use std::fmt;

/// Length of a raw Ed25519 public key
pub const PUBLIC_KEY_LENGTH: usize = 32;
/// Length of a raw Ed25519 private key (seed followed by public key)
pub const PRIVATE_KEY_LENGTH: usize = 64;

/// Ed25519 private key, usable as a `Signator`.
pub struct Ed25519PrivateKey {
    key_pair: Ed25519KeyPair,
}

impl Ed25519PrivateKey {
    /// Load from the 64-byte `seed || public key` form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LENGTH {
            return Err(HttpSigError::bad_key(format!(
                "bad ed25519 private key length: expected {PRIVATE_KEY_LENGTH}, got {}",
                bytes.len()
            )));
        }
        let (seed, public_key) = bytes.split_at(32);
        let key_pair = Ed25519KeyPair::from_seed_and_public_key(seed, public_key)
            .map_err(|e| HttpSigError::bad_key(format!("ed25519 key rejected: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Load from hex of the 64-byte form.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| HttpSigError::bad_key(format!("invalid hex in ed25519 private key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Load from a PKCS#8 v1 or v2 document.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self> {
        let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der)
            .map_err(|e| HttpSigError::bad_key(format!("ed25519 key rejected: {e}")))?;
        Ok(Self { key_pair })
    }

    /// The matching verifier.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey::new(self.key_pair.public_key().as_ref())
    }
}

impl fmt::Debug for Ed25519PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519PrivateKey")
            .field("public_key", &hex::encode(self.key_pair.public_key().as_ref()))
            .finish_non_exhaustive()
    }
}

impl Signator for Ed25519PrivateKey {
    fn sign(&self, _rng: &mut dyn RngCore, message: &[u8], opts: &SignerOpts) -> Result<Vec<u8>> {
        if opts.hash.is_some() {
            return Err(HttpSigError::malformed(
                "ed25519: cannot sign hashed message, expected no prehash",
            ));
        }
        Ok(self.key_pair.sign(message).as_ref().to_vec())
    }
}

/// Ed25519 public key, usable as a `Verifier`.
///
/// The length is checked when verifying so that a misconfigured key is an
/// error on the request that uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519PublicKey(Vec<u8>);

impl Ed25519PublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| HttpSigError::bad_key(format!("invalid hex in ed25519 public key: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl Verifier for Ed25519PublicKey {
    fn verify(&self, message: &[u8], sig: &[u8], opts: &SignerOpts) -> Result<bool> {
        if opts.hash.is_some() {
            return Err(HttpSigError::malformed(
                "ed25519: cannot verify hashed message, expected no prehash",
            ));
        }
        if self.0.len() != PUBLIC_KEY_LENGTH {
            return Err(HttpSigError::bad_key(format!(
                "ed25519: bad public key length: {}",
                self.0.len()
            )));
        }
        Ok(UnparsedPublicKey::new(&ED25519, &self.0)
            .verify(message, sig)
            .is_ok())
    }
}
