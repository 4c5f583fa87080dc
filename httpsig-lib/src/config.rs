//! Keystore and signer configuration
//!
//! Both configurations are JSON documents. A keystore configuration pins the
//! verification parameters and lists the known keys:
//!
//! ```json
//! {
//!   "algorithm": "ed25519",
//!   "headers": ["digest", "foo"],
//!   "keys": [
//!     { "key_id": "primary", "type": "ed25519", "public_key": "e787..." },
//!     { "key_id": "enclave", "type": "nitro", "pcrs": { "2": "ab12..." } }
//!   ]
//! }
//! ```
//!
//! A signer configuration names one key id and its private key or secret.

use crate::algorithm::{Algorithm, DigestAlgorithm};
use crate::ed25519::{Ed25519PrivateKey, Ed25519PublicKey};
use crate::error::{HttpSigError, Result};
use crate::hmac_key::HmacKey;
use crate::keystore::{MemoryKeystore, ParameterizedKeystoreVerifier};
use crate::nitro::{pem_to_der, EnclaveVerifier};
use crate::params::SignatureParams;
use crate::signator::{ParameterizedSignator, Signator, Verifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Environment variable holding the path of the keystore configuration
pub const KEYSTORE_CONFIG_ENV: &str = "HTTPSIG_KEYSTORE_CONFIG";
/// Environment variable holding the path of the signer configuration
pub const SIGNER_CONFIG_ENV: &str = "HTTPSIG_SIGNER_CONFIG";

/// Verification key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VerifierKey {
    /// Hex of the 32-byte public key
    Ed25519 { public_key: String },
    /// Shared secret, used as raw bytes
    Hmac { secret: String },
    /// Expected PCRs (index to hex); the AWS root unless `root_pem` is set
    Nitro {
        pcrs: BTreeMap<u32, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root_pem: Option<String>,
    },
}

impl VerifierKey {
    fn algorithm(&self) -> Algorithm {
        match self {
            VerifierKey::Ed25519 { .. } => Algorithm::Ed25519,
            VerifierKey::Hmac { .. } => Algorithm::Hs2019,
            VerifierKey::Nitro { .. } => Algorithm::AwsNitro,
        }
    }

    fn build(&self) -> Result<Arc<dyn Verifier>> {
        let verifier: Arc<dyn Verifier> = match self {
            VerifierKey::Ed25519 { public_key } => Arc::new(Ed25519PublicKey::from_hex(public_key)?),
            VerifierKey::Hmac { secret } => Arc::new(HmacKey::new(secret)),
            VerifierKey::Nitro { pcrs, root_pem } => {
                let pcrs = pcrs
                    .iter()
                    .map(|(index, value)| {
                        hex::decode(value)
                            .map(|bytes| (*index, bytes))
                            .map_err(|e| HttpSigError::config(format!("Invalid hex in PCR{index}: {e}")))
                    })
                    .collect::<Result<BTreeMap<_, _>>>()?;
                let enclave = match root_pem {
                    Some(pem) => EnclaveVerifier::with_root_der(pem_to_der(pem)?, pcrs),
                    None => EnclaveVerifier::new(pcrs)?,
                };
                Arc::new(enclave)
            }
        };
        Ok(verifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key_id: String,
    #[serde(flatten)]
    pub key: VerifierKey,
}

/// Pinned verification parameters plus the known keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreConfig {
    pub algorithm: Algorithm,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_algorithm: Option<DigestAlgorithm>,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

impl KeystoreConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            keys = config.keys.len(),
            algorithm = %config.algorithm,
            "Loaded keystore configuration"
        );
        Ok(config)
    }

    /// Load from the file named by `HTTPSIG_KEYSTORE_CONFIG`.
    pub fn from_env() -> Result<Self> {
        Self::from_file(path_from_env(KEYSTORE_CONFIG_ENV)?)
    }

    fn validate(&self) -> Result<()> {
        if self.params().is_malformed() {
            return Err(HttpSigError::config(
                "keystore algorithm must be set and headers must be lower-case",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.keys {
            if !seen.insert(entry.key_id.as_str()) {
                return Err(HttpSigError::config(format!("duplicate key id {}", entry.key_id)));
            }
            if entry.key.algorithm() != self.algorithm {
                return Err(HttpSigError::config(format!(
                    "key {} is not usable with algorithm {}",
                    entry.key_id, self.algorithm
                )));
            }
        }
        Ok(())
    }

    /// The pinned parameters (the key id is filled in per message).
    pub fn params(&self) -> SignatureParams {
        SignatureParams {
            algorithm: self.algorithm,
            key_id: String::new(),
            digest_algorithm: self.digest_algorithm,
            headers: self.headers.clone(),
        }
    }

    pub fn build_keystore(&self) -> Result<MemoryKeystore> {
        let keystore = MemoryKeystore::new();
        for entry in &self.keys {
            keystore.insert(entry.key_id.clone(), entry.key.build()?);
        }
        Ok(keystore)
    }

    pub fn build_verifier(&self) -> Result<ParameterizedKeystoreVerifier> {
        Ok(ParameterizedKeystoreVerifier::new(
            self.params(),
            Arc::new(self.build_keystore()?),
        ))
    }
}

/// Signing key material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignerKey {
    /// Hex of the 64-byte seed and public key
    Ed25519 { private_key: String },
    Hmac { secret: String },
}

impl std::fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerKey::Ed25519 { .. } => f.write_str("Ed25519 { .. }"),
            SignerKey::Hmac { .. } => f.write_str("Hmac { .. }"),
        }
    }
}

/// One signing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    pub key_id: String,
    pub algorithm: Algorithm,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_algorithm: Option<DigestAlgorithm>,
    pub key: SignerKey,
}

impl SignerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            key_id = %config.key_id,
            algorithm = %config.algorithm,
            "Loaded signer configuration"
        );
        Ok(config)
    }

    /// Load from the file named by `HTTPSIG_SIGNER_CONFIG`.
    pub fn from_env() -> Result<Self> {
        Self::from_file(path_from_env(SIGNER_CONFIG_ENV)?)
    }

    pub fn params(&self) -> SignatureParams {
        SignatureParams {
            algorithm: self.algorithm,
            key_id: self.key_id.clone(),
            digest_algorithm: self.digest_algorithm,
            headers: self.headers.clone(),
        }
    }

    pub fn build_signator(&self) -> Result<ParameterizedSignator> {
        let params = self.params();
        if params.is_malformed() {
            return Err(HttpSigError::config(
                "signer algorithm must be set and headers must be lower-case",
            ));
        }

        let signator: Arc<dyn Signator> = match (&self.key, self.algorithm) {
            (SignerKey::Ed25519 { private_key }, Algorithm::Ed25519) => {
                Arc::new(Ed25519PrivateKey::from_hex(private_key)?)
            }
            (SignerKey::Hmac { secret }, Algorithm::Hs2019) => Arc::new(HmacKey::new(secret)),
            (_, algorithm) => {
                return Err(HttpSigError::config(format!(
                    "signer key is not usable with algorithm {algorithm}"
                )))
            }
        };
        Ok(ParameterizedSignator::new(params, signator))
    }
}

fn path_from_env(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| HttpSigError::config(format!("{var} not set")))
}
