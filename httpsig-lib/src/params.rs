//! Signature parameters and the signing string
//!
//! `SignatureParams` names the algorithm, key id and ordered list of covered
//! headers. `build_signing_string` turns those parameters plus a live message
//! into the exact bytes that get signed:
//!
//! ```text
//! (request-target): get /foo
//! host: example.org
//! digest: SHA-256=RK/0qy18MlBSVnWgjwz6lZEWjP/lF5HF9bvEF8FabDg=
//! foo: bar
//! ```
//!
//! Each line is `<name>: <value>`, joined by `\n`, with no trailing newline.

use crate::algorithm::{Algorithm, DigestAlgorithm};
use crate::error::{HttpSigError, Result};
use crate::message::{joined_header_value, resolve_host, HttpMessage};
use crate::signator::{Signator, SignerOpts, Verifier};
use crate::signature::Signature;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::{HeaderMap, HeaderName, HeaderValue};

/// The host header
pub const HOST_HEADER: &str = "host";
/// Header where a digest of the body is stored
pub const DIGEST_HEADER: &str = "digest";
/// Pseudo-header consisting of the HTTP method and request uri
pub const REQUEST_TARGET_HEADER: &str = "(request-target)";
/// Header carrying the signature itself
pub const SIGNATURE_HEADER: &str = "signature";

/// Covered headers when the parameters name none
const DEFAULT_HEADERS: &[&str] = &["date"];

/// Parameters needed to create and verify signatures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureParams {
    pub algorithm: Algorithm,
    pub key_id: String,
    /// Hash for the `digest` pseudo-header, SHA-256 when unset
    pub digest_algorithm: Option<DigestAlgorithm>,
    /// Covered header names, all lower-case
    pub headers: Vec<String>,
}

impl SignatureParams {
    pub fn new(algorithm: Algorithm, key_id: impl Into<String>) -> Self {
        Self {
            algorithm,
            key_id: key_id.into(),
            digest_algorithm: None,
            headers: Vec::new(),
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = Some(digest_algorithm);
        self
    }

    /// True if the algorithm is unset or any covered header is not a
    /// lower-case header name (or `(request-target)`).
    pub fn is_malformed(&self) -> bool {
        if self.algorithm == Algorithm::Invalid {
            return true;
        }
        self.headers.iter().any(|header| {
            header.chars().any(|c| c.is_uppercase())
                || (header != REQUEST_TARGET_HEADER
                    && HeaderName::from_bytes(header.as_bytes()).is_err())
        })
    }

    /// Covered headers, falling back to `date` when the list is empty.
    pub fn covered_headers(&self) -> Vec<&str> {
        if self.headers.is_empty() {
            DEFAULT_HEADERS.to_vec()
        } else {
            self.headers.iter().map(String::as_str).collect()
        }
    }

    /// Build the signing string for `message`.
    ///
    /// When `digest` is covered the body digest is recomputed and written to
    /// the message's own `Digest` header, replacing any value already there.
    pub fn build_signing_string<M: HttpMessage + ?Sized>(&self, message: &mut M) -> Result<Vec<u8>> {
        if self.is_malformed() {
            return Err(HttpSigError::malformed(
                "refusing to build signing string with malformed params",
            ));
        }

        let mut out = Vec::new();
        for (i, header) in self.covered_headers().into_iter().enumerate() {
            if i > 0 {
                out.push(b'\n');
            }

            let value = match header {
                REQUEST_TARGET_HEADER => {
                    let target = message.request_target().ok_or_else(|| {
                        HttpSigError::missing_context(format!(
                            "request must be present to use the {REQUEST_TARGET_HEADER} pseudo-header"
                        ))
                    })?;
                    target.pseudo_header_value().into_bytes()
                }
                DIGEST_HEADER => {
                    let digest = self
                        .digest_algorithm
                        .unwrap_or_default()
                        .header_value(message.body());
                    message
                        .headers_mut()
                        .insert(DIGEST_HEADER, HeaderValue::from_str(&digest)?);
                    digest.into_bytes()
                }
                HOST_HEADER => resolve_host(message)?,
                other => joined_header_value(message.headers(), other).unwrap_or_default(),
            };

            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(&value);
        }
        Ok(out)
    }

    /// Sign `message` and set its `Signature` header.
    pub fn sign_message<S, M>(&self, signator: &S, opts: &SignerOpts, message: &mut M) -> Result<()>
    where
        S: Signator + ?Sized,
        M: HttpMessage + ?Sized,
    {
        let signing_string = self.build_signing_string(message)?;
        let sig = signator.sign(&mut rand::thread_rng(), &signing_string, opts)?;

        let signature = Signature {
            params: self.clone(),
            sig: BASE64.encode(sig),
        };
        let header = signature.marshal()?;
        message
            .headers_mut()
            .insert(SIGNATURE_HEADER, HeaderValue::from_str(&header)?);
        Ok(())
    }

    /// Verify the `Signature` header of `message` against these parameters.
    ///
    /// Only the signature bytes are taken from the wire; the algorithm and
    /// covered headers are the ones in `self`.
    pub fn verify_message<V, M>(&self, verifier: &V, opts: &SignerOpts, message: &mut M) -> Result<bool>
    where
        V: Verifier + ?Sized,
        M: HttpMessage + ?Sized,
    {
        let signing_string = self.build_signing_string(message)?;
        let candidate = signature_from_headers(message.headers())?;
        let sig = BASE64.decode(&candidate.sig)?;
        verifier.verify(&signing_string, &sig, opts)
    }

    /// Parameters claimed by the `Signature` header of a signed message.
    pub fn from_message<M: HttpMessage + ?Sized>(message: &M) -> Result<Self> {
        Ok(signature_from_headers(message.headers())?.params)
    }
}

/// Parse the `Signature` header out of a header map.
pub(crate) fn signature_from_headers(headers: &HeaderMap) -> Result<Signature> {
    let value = headers
        .get(SIGNATURE_HEADER)
        .ok_or_else(|| HttpSigError::header_parse("signature header is missing"))?;
    let text = value
        .to_str()
        .map_err(|_| HttpSigError::header_parse("signature header is not visible ASCII"))?;
    text.parse()
}
