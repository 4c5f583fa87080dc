//! Signature and digest algorithm registries
//!
//! `Algorithm` is the closed set of signature algorithms that can appear in
//! the `algorithm` field of a Signature header. `DigestAlgorithm` is the set
//! of hashes usable for the `Digest` header.

use crate::error::{HttpSigError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

/// Signature algorithm carried in the `algorithm` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// EdDSA over Curve25519 (`ed25519`, deprecated on the wire but accepted)
    Ed25519,
    /// Catch-all token. Currently HMAC-SHA-512 with a shared secret.
    Hs2019,
    /// AWS Nitro enclave attestation document
    AwsNitro,
    /// Placeholder for unset parameters. Never valid on the wire.
    #[default]
    Invalid,
}

impl Algorithm {
    /// Wire token for this algorithm, or an error for `Invalid`.
    pub fn token(&self) -> Result<&'static str> {
        match self {
            Algorithm::Ed25519 => Ok("ed25519"),
            Algorithm::Hs2019 => Ok("hs2019"),
            Algorithm::AwsNitro => Ok("awsnitro"),
            Algorithm::Invalid => Err(HttpSigError::malformed("not a valid Algorithm")),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token().unwrap_or("invalid"))
    }
}

impl FromStr for Algorithm {
    type Err = HttpSigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ed25519" => Ok(Algorithm::Ed25519),
            "hs2019" => Ok(Algorithm::Hs2019),
            "awsnitro" => Ok(Algorithm::AwsNitro),
            other => Err(HttpSigError::header_parse(format!(
                "unsupported algorithm: {other}"
            ))),
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let token = self.token().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(token)
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash used to compute the `Digest` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Name as it appears before the `=` in a Digest header.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Raw hash of `data`.
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Digest header value: `<name>=<base64 hash>`.
    ///
    /// An empty body still produces a valid digest (the hash of empty input).
    pub fn header_value(&self, body: &[u8]) -> String {
        format!("{}={}", self.name(), BASE64.encode(self.hash(body)))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = HttpSigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SHA-256" => Ok(DigestAlgorithm::Sha256),
            "SHA-384" => Ok(DigestAlgorithm::Sha384),
            "SHA-512" => Ok(DigestAlgorithm::Sha512),
            other => Err(HttpSigError::malformed(format!(
                "unsupported digest algorithm: {other}"
            ))),
        }
    }
}

impl Serialize for DigestAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DigestAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
