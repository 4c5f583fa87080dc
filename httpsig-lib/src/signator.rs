//! Signing and verification capabilities
//!
//! Any type that can turn a message into signature bytes is a `Signator`;
//! any type that can check signature bytes against a message is a
//! `Verifier`. Key types implement one or both, and everything above this
//! module (parameters, keystores, response writer) only sees the traits.

use crate::algorithm::DigestAlgorithm;
use crate::error::Result;
use crate::message::HttpMessage;
use crate::params::SignatureParams;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// Algorithm specific options passed through to a signator or verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerOpts {
    /// Prehash the message before signing. Not supported by every algorithm.
    pub hash: Option<DigestAlgorithm>,
}

/// Produces a signature over the exact message bytes.
pub trait Signator: Send + Sync {
    /// Sign `message`. Implementations that need randomness draw it from `rng`.
    fn sign(&self, rng: &mut dyn RngCore, message: &[u8], opts: &SignerOpts) -> Result<Vec<u8>>;
}

/// Checks a signature over the exact message bytes.
///
/// `Ok(false)` means the signature is wrong; `Err` means the input or the
/// verifier itself is unusable. The `Display` form identifies the verifier
/// in logs and must not be used for security decisions.
pub trait Verifier: fmt::Display + Send + Sync {
    fn verify(&self, message: &[u8], sig: &[u8], opts: &SignerOpts) -> Result<bool>;
}

impl<T: Signator + ?Sized> Signator for Arc<T> {
    fn sign(&self, rng: &mut dyn RngCore, message: &[u8], opts: &SignerOpts) -> Result<Vec<u8>> {
        (**self).sign(rng, message, opts)
    }
}

impl<T: Verifier + ?Sized> Verifier for Arc<T> {
    fn verify(&self, message: &[u8], sig: &[u8], opts: &SignerOpts) -> Result<bool> {
        (**self).verify(message, sig, opts)
    }
}

/// Signature parameters bundled with the signator that fulfils them.
#[derive(Clone)]
pub struct ParameterizedSignator {
    pub params: SignatureParams,
    pub signator: Arc<dyn Signator>,
    pub opts: SignerOpts,
}

impl fmt::Debug for ParameterizedSignator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterizedSignator")
            .field("params", &self.params)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl ParameterizedSignator {
    pub fn new(params: SignatureParams, signator: Arc<dyn Signator>) -> Self {
        Self {
            params,
            signator,
            opts: SignerOpts::default(),
        }
    }

    pub fn with_opts(mut self, opts: SignerOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Sign a request or response in place, setting its `Signature` header.
    pub fn sign_message<M: HttpMessage + ?Sized>(&self, message: &mut M) -> Result<()> {
        self.params
            .sign_message(self.signator.as_ref(), &self.opts, message)
    }

    pub fn sign_request<B: AsRef<[u8]>>(&self, req: &mut http::Request<B>) -> Result<()> {
        self.sign_message(req)
    }

    pub fn sign_response<B: AsRef<[u8]>>(&self, resp: &mut http::Response<B>) -> Result<()> {
        self.sign_message(resp)
    }
}
