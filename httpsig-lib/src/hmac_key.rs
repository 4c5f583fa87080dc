//! HMAC-SHA-512 shared secret (`hs2019`)
//!
//! The same key type signs and verifies. Verification recomputes the MAC and
//! compares in constant time through `Mac::verify_slice`.

use crate::error::{HttpSigError, Result};
use crate::signator::{Signator, SignerOpts, Verifier};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

type HmacSha512 = Hmac<Sha512>;

/// Shared secret for HMAC-SHA-512 signatures.
///
/// The key is the raw bytes of the secret as configured; a hex-looking
/// secret is not decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct HmacKey(Vec<u8>);

impl HmacKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self(secret.as_ref().to_vec())
    }

    fn mac(&self, message: &[u8]) -> Result<HmacSha512> {
        let mut mac = HmacSha512::new_from_slice(&self.0)
            .map_err(|e| HttpSigError::bad_key(format!("hmac key rejected: {e}")))?;
        mac.update(message);
        Ok(mac)
    }

    /// Short fingerprint of the secret, safe to log.
    pub fn fingerprint(&self) -> String {
        hex::encode(&Sha256::digest(&self.0)[..8])
    }
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HmacKey").field(&self.fingerprint()).finish()
    }
}

impl fmt::Display for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hmac-sha512:{}", self.fingerprint())
    }
}

impl Signator for HmacKey {
    fn sign(&self, _rng: &mut dyn RngCore, message: &[u8], _opts: &SignerOpts) -> Result<Vec<u8>> {
        Ok(self.mac(message)?.finalize().into_bytes().to_vec())
    }
}

impl Verifier for HmacKey {
    fn verify(&self, message: &[u8], sig: &[u8], _opts: &SignerOpts) -> Result<bool> {
        Ok(self.mac(message)?.verify_slice(sig).is_ok())
    }
}
