//! Keystores and keystore-backed verification
//!
//! A `Keystore` resolves the verifier for the key id claimed by a signed
//! message. `ParameterizedKeystoreVerifier` runs the full verification: parse
//! the wire header, resolve the claimed key, then check the signature with
//! the keystore owner's pinned parameters rather than the ones on the wire.

use crate::error::{HttpSigError, Result};
use crate::message::HttpMessage;
use crate::params::{signature_from_headers, SignatureParams};
use crate::signator::{SignerOpts, Verifier};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use http::Extensions;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resolves verifiers by key id.
///
/// Lookups may run concurrently. `Ok(None)` means the key id is unknown;
/// `Err` is reserved for a keystore that could not answer at all.
pub trait Keystore: Send + Sync {
    fn lookup_verifier(
        &self,
        key_id: &str,
        context: &mut Extensions,
    ) -> Result<Option<Arc<dyn Verifier>>>;
}

impl<K: Keystore + ?Sized> Keystore for Arc<K> {
    fn lookup_verifier(
        &self,
        key_id: &str,
        context: &mut Extensions,
    ) -> Result<Option<Arc<dyn Verifier>>> {
        (**self).lookup_verifier(key_id, context)
    }
}

/// Identity attached to the verification context by `MemoryKeystore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity(pub String);

/// Returns the same verifier for every key id.
#[derive(Clone)]
pub struct StaticKeystore(pub Arc<dyn Verifier>);

impl StaticKeystore {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self(verifier)
    }
}

impl Keystore for StaticKeystore {
    fn lookup_verifier(
        &self,
        _key_id: &str,
        _context: &mut Extensions,
    ) -> Result<Option<Arc<dyn Verifier>>> {
        Ok(Some(self.0.clone()))
    }
}

/// In-memory keystore keyed by key id.
#[derive(Default)]
pub struct MemoryKeystore {
    verifiers: DashMap<String, Arc<dyn Verifier>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the verifier for `key_id`.
    pub fn insert(&self, key_id: impl Into<String>, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(key_id.into(), verifier);
    }

    pub fn remove(&self, key_id: &str) -> bool {
        self.verifiers.remove(key_id).is_some()
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.verifiers.contains_key(key_id)
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}

impl fmt::Debug for MemoryKeystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.verifiers.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        f.debug_struct("MemoryKeystore").field("keys", &keys).finish()
    }
}

impl Keystore for MemoryKeystore {
    fn lookup_verifier(
        &self,
        key_id: &str,
        context: &mut Extensions,
    ) -> Result<Option<Arc<dyn Verifier>>> {
        let Some(verifier) = self.verifiers.get(key_id).map(|v| v.value().clone()) else {
            return Ok(None);
        };
        context.insert(KeyIdentity(key_id.to_string()));
        Ok(Some(verifier))
    }
}

/// Successful keystore verification.
#[derive(Debug)]
pub struct Verified {
    /// The authenticated key id
    pub key_id: String,
    /// Whatever the keystore attached while resolving the key
    pub context: Extensions,
}

/// Verifies messages against a keystore using pinned parameters.
#[derive(Clone)]
pub struct ParameterizedKeystoreVerifier {
    /// Algorithm, covered headers and digest algorithm to enforce
    pub params: SignatureParams,
    pub keystore: Arc<dyn Keystore>,
    pub opts: SignerOpts,
}

impl fmt::Debug for ParameterizedKeystoreVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterizedKeystoreVerifier")
            .field("params", &self.params)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl ParameterizedKeystoreVerifier {
    pub fn new(params: SignatureParams, keystore: Arc<dyn Keystore>) -> Self {
        Self {
            params,
            keystore,
            opts: SignerOpts::default(),
        }
    }

    pub fn with_opts(mut self, opts: SignerOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Verify a signed message and return the authenticated key id.
    ///
    /// Unknown key ids fail with `KeyResolution`, a failed cryptographic
    /// check with `SignatureInvalid`.
    pub fn verify_message<M: HttpMessage + ?Sized>(&self, message: &mut M) -> Result<Verified> {
        self.verify_message_with_context(message, Extensions::new())
    }

    /// Like [`verify_message`](Self::verify_message), with `context` handed
    /// to the keystore for the lookup and returned in [`Verified`].
    pub fn verify_message_with_context<M: HttpMessage + ?Sized>(
        &self,
        message: &mut M,
        mut context: Extensions,
    ) -> Result<Verified> {
        let candidate = signature_from_headers(message.headers())?;
        let key_id = candidate.params.key_id.clone();

        let verifier = self
            .keystore
            .lookup_verifier(&key_id, &mut context)?
            .ok_or_else(|| {
                debug!(key_id = %key_id, "no verifier for claimed key id");
                HttpSigError::key_resolution(format!(
                    "no verifier matching keyId {key_id} was found"
                ))
            })?;

        let signing_string = self.pinned(candidate.params).build_signing_string(message)?;
        let sig = BASE64.decode(&candidate.sig)?;

        if !verifier.verify(&signing_string, &sig, &self.opts)? {
            debug!(key_id = %key_id, verifier = %verifier, "signature rejected");
            return Err(HttpSigError::SignatureInvalid);
        }

        debug!(key_id = %key_id, verifier = %verifier, "signature verified");
        Ok(Verified { key_id, context })
    }

    /// Verify a request; the keystore sees a copy of its extensions.
    pub fn verify_request<B: AsRef<[u8]>>(&self, req: &mut http::Request<B>) -> Result<Verified> {
        let context = req.extensions().clone();
        self.verify_message_with_context(req, context)
    }

    /// Verify a response; the keystore sees a copy of its extensions.
    pub fn verify_response<B: AsRef<[u8]>>(&self, resp: &mut http::Response<B>) -> Result<Verified> {
        let context = resp.extensions().clone();
        self.verify_message_with_context(resp, context)
    }

    /// Wire params with everything except the key id replaced by ours.
    fn pinned(&self, wire: SignatureParams) -> SignatureParams {
        SignatureParams {
            algorithm: self.params.algorithm,
            key_id: wire.key_id,
            digest_algorithm: self.params.digest_algorithm,
            headers: self.params.headers.clone(),
        }
    }
}
