//! httpsig - HTTP message signatures
//!
//! Signs and verifies HTTP requests and responses with draft-cavage style
//! `Signature` headers. Covered headers are canonicalized into a signing
//! string, which is signed with Ed25519, HMAC-SHA-512 (`hs2019`) or an AWS
//! Nitro enclave attestation (`awsnitro`).
//!
//! Verification always uses the verifier's pinned parameters; the algorithm
//! and header list claimed on the wire are never trusted.
pub mod algorithm;
pub mod config;
pub mod ed25519;
pub mod encapsulate;
pub mod error;
pub mod hmac_key;
pub mod keystore;
pub mod message;
pub mod nitro;
pub mod params;
pub mod response_writer;
pub mod signator;
pub mod signature;

pub use algorithm::{Algorithm, DigestAlgorithm};
pub use config::{KeystoreConfig, SignerConfig};
pub use ed25519::{Ed25519PrivateKey, Ed25519PublicKey};
pub use encapsulate::{EncapsulatedRequest, EncapsulatedResponse};
pub use error::{HttpSigError, Result};
pub use hmac_key::HmacKey;
pub use keystore::{
    KeyIdentity, Keystore, MemoryKeystore, ParameterizedKeystoreVerifier, StaticKeystore, Verified,
};
pub use message::{HttpMessage, RequestTarget};
pub use nitro::{Attester, AttestationDocument, EnclaveSigner, EnclaveVerifier};
pub use params::SignatureParams;
pub use response_writer::{BufferedResponse, ResponseWriter, SigningResponseWriter};
pub use signator::{ParameterizedSignator, Signator, SignerOpts, Verifier};
pub use signature::Signature;
