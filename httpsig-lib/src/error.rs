//! Error types for httpsig
//!
//! A single closed error type covering every failure mode of signing,
//! verification, header parsing, key resolution and encapsulation. Callers
//! match on the variant instead of inspecting messages.

use thiserror::Error;

/// Result type alias using HttpSigError
pub type Result<T> = std::result::Result<T, HttpSigError>;

/// Error type for all httpsig operations
#[derive(Error, Debug)]
pub enum HttpSigError {
    /// Invalid algorithm, non lower-case header name, or an encapsulated
    /// header that is not a valid HTTP header
    #[error("Malformed parameters: {0}")]
    MalformedParameters(String),

    /// A pseudo-header needs request context the message does not carry
    #[error("Missing request context: {0}")]
    MissingContext(String),

    /// The Signature header is absent, empty or missing a required field
    #[error("Signature header error: {0}")]
    HeaderParse(String),

    /// The keystore has no verifier for the claimed key id
    #[error("Key resolution error: {0}")]
    KeyResolution(String),

    /// Key material of the wrong size or shape
    #[error("Bad key material: {0}")]
    BadKeyMaterial(String),

    /// The cryptographic check failed
    #[error("signature is not valid")]
    SignatureInvalid,

    /// A signator could not produce a signature
    #[error("Signing error: {0}")]
    Signing(String),

    /// An attestation document could not be decoded
    #[error("Attestation error: {0}")]
    Attestation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Base64 decoding errors
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors (configuration files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpSigError {
    /// Create a malformed parameters error with context
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedParameters(msg.into())
    }

    /// Create a missing context error with context
    pub fn missing_context(msg: impl Into<String>) -> Self {
        Self::MissingContext(msg.into())
    }

    /// Create a header parse error with context
    pub fn header_parse(msg: impl Into<String>) -> Self {
        Self::HeaderParse(msg.into())
    }

    /// Create a key resolution error with context
    pub fn key_resolution(msg: impl Into<String>) -> Self {
        Self::KeyResolution(msg.into())
    }

    /// Create a bad key material error with context
    pub fn bad_key(msg: impl Into<String>) -> Self {
        Self::BadKeyMaterial(msg.into())
    }

    /// Create a signing error with context
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create an attestation error with context
    pub fn attestation(msg: impl Into<String>) -> Self {
        Self::Attestation(msg.into())
    }

    /// Create a config error with context
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the error means "the signature is just wrong" rather than
    /// a misconfiguration or malformed input.
    pub fn is_signature_invalid(&self) -> bool {
        matches!(self, Self::SignatureInvalid)
    }
}

impl From<http::Error> for HttpSigError {
    fn from(e: http::Error) -> Self {
        HttpSigError::MalformedParameters(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for HttpSigError {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        HttpSigError::MalformedParameters(e.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for HttpSigError {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        HttpSigError::MalformedParameters(e.to_string())
    }
}
