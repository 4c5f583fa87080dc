//! AWS Nitro enclave attestation as a signature algorithm (`awsnitro`)
//!
//! "Signing" asks the enclave's security module for an attestation document
//! whose user data is the SHA-256 of the signing string. "Verifying" checks
//! that document:
//!
//! 1. COSE_Sign1 envelope and CBOR payload decode
//! 2. `cabundle[0]` is the pinned root certificate
//! 3. every certificate in `cabundle ++ [certificate]` is valid at `now()`,
//!    names its predecessor as issuer and is signed by it; every certificate
//!    but the leaf is a CA permitted to sign certificates at its depth
//! 4. the ES384 COSE signature verifies with the leaf certificate key
//! 5. user data equals SHA-256 of the message
//! 6. every expected PCR is present and byte-equal
//!
//! A document that does not decode is an error. Any other failed check,
//! including an empty PCR expectation map, is an invalid signature.

use crate::error::{HttpSigError, Result};
use crate::signator::{Signator, SignerOpts, Verifier};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use coset::{iana, CborSerializable, CoseSign1, RegisteredLabelWithPrivate, TaggedCborSerializable};
use rand::RngCore;
use ring::signature::{UnparsedPublicKey, ECDSA_P384_SHA384_FIXED};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

/// Root certificate for Nitro enclaves in AWS, from
/// https://aws-nitro-enclaves.amazonaws.com/AWS_NitroEnclaves_Root-G1.zip
pub const AWS_NITRO_ROOT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIICETCCAZagAwIBAgIRAPkxdWgbkK/hHUbMtOTn+FYwCgYIKoZIzj0EAwMwSTEL
MAkGA1UEBhMCVVMxDzANBgNVBAoMBkFtYXpvbjEMMAoGA1UECwwDQVdTMRswGQYD
VQQDDBJhd3Mubml0cm8tZW5jbGF2ZXMwHhcNMTkxMDI4MTMyODA1WhcNNDkxMDI4
MTQyODA1WjBJMQswCQYDVQQGEwJVUzEPMA0GA1UECgwGQW1hem9uMQwwCgYDVQQL
DANBV1MxGzAZBgNVBAMMEmF3cy5uaXRyby1lbmNsYXZlczB2MBAGByqGSM49AgEG
BSuBBAAiA2IABPwCVOumCMHzaHDimtqQvkY4MpJzbolL//Zy2YlES1BR5TSksfbb
48C8WBoyt7F2Bw7eEtaaP+ohG2bnUs990d0JX28TcPQXCEPZ3BABIeTPYwEoCWZE
h8l5YoQwTcU/9KNCMEAwDwYDVR0TAQH/BAUwAwEB/zAdBgNVHQ4EFgQUkCW1DdkF
R+eWw5b6cp3PmanfS5YwDgYDVR0PAQH/BAQDAgGGMAoGCCqGSM49BAMDA2kAMGYC
MQCjfy+Rocm9Xue4YnwWmNJVA44fA0P5W2OpYow9OYCVRaEevL8uO1XYru5xtMPW
rfMCMQCi85sWBbJwKKXdS6BptQFuZbT73o/gBh1qUxl/nNr12UO8Yfwr6wPLb+6N
IwLz3/Y=
-----END CERTIFICATE-----";

/// PCR1 for images built with the official nitro cli tooling. PCR1 measures
/// the kernel and boot ramfs shipped with the tooling, so it only changes
/// when the tooling is upgraded.
pub const EXPECTED_PCR1_HEX: &str = "dc9f5af64d83079f2fddca94016f1cba17eb95eb78638eaff32c75517274f05537aabfcbe8e02cb8837906197cf58506";

/// Source of the verifier's notion of "now"
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Payload of a Nitro attestation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationDocument {
    pub module_id: String,
    pub digest: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub pcrs: BTreeMap<u32, ByteBuf>,
    /// Leaf certificate (DER)
    pub certificate: ByteBuf,
    /// Root first, then intermediates (DER)
    pub cabundle: Vec<ByteBuf>,
    #[serde(default)]
    pub public_key: Option<ByteBuf>,
    #[serde(default)]
    pub user_data: Option<ByteBuf>,
    #[serde(default)]
    pub nonce: Option<ByteBuf>,
}

/// A session with the enclave's security module that can issue attestation
/// documents binding caller-supplied user data.
pub trait Attester: Send + Sync {
    fn attest(&self, user_data: &[u8]) -> Result<Vec<u8>>;
}

/// Signs by attesting to the SHA-256 of the message.
#[derive(Clone)]
pub struct EnclaveSigner {
    attester: Arc<dyn Attester>,
}

impl EnclaveSigner {
    pub fn new(attester: Arc<dyn Attester>) -> Self {
        Self { attester }
    }
}

impl Signator for EnclaveSigner {
    fn sign(&self, _rng: &mut dyn RngCore, message: &[u8], _opts: &SignerOpts) -> Result<Vec<u8>> {
        let user_data = Sha256::digest(message);
        let document = self.attester.attest(&user_data)?;
        if document.is_empty() {
            return Err(HttpSigError::signing(
                "security module did not return an attestation",
            ));
        }
        Ok(document)
    }
}

/// Verifies attestation documents against a pinned root and expected PCRs.
#[derive(Clone)]
pub struct EnclaveVerifier {
    root_der: Vec<u8>,
    pcrs: BTreeMap<u32, Vec<u8>>,
    now: Clock,
}

impl EnclaveVerifier {
    /// Verifier pinned to the AWS Nitro Enclaves root.
    pub fn new(pcrs: BTreeMap<u32, Vec<u8>>) -> Result<Self> {
        Ok(Self::with_root_der(aws_root_der()?, pcrs))
    }

    /// Verifier pinned to an arbitrary root certificate (DER).
    pub fn with_root_der(root_der: Vec<u8>, pcrs: BTreeMap<u32, Vec<u8>>) -> Self {
        Self {
            root_der,
            pcrs,
            now: Arc::new(Utc::now),
        }
    }

    /// Replace the clock used for certificate validity checks.
    pub fn with_clock(mut self, now: Clock) -> Self {
        self.now = now;
        self
    }

    pub fn expected_pcrs(&self) -> &BTreeMap<u32, Vec<u8>> {
        &self.pcrs
    }

    /// Verify a document's chain and signature and return its PCRs, without
    /// checking user data or PCR expectations.
    pub fn document_pcrs(&self, document: &[u8]) -> Result<BTreeMap<u32, Vec<u8>>> {
        let document = self
            .verify_document(None, document)?
            .ok_or(HttpSigError::SignatureInvalid)?;
        Ok(document
            .pcrs
            .into_iter()
            .map(|(index, value)| (index, value.into_vec()))
            .collect())
    }

    /// Decode and authenticate a document. `Ok(None)` when any check fails.
    fn verify_document(
        &self,
        message: Option<&[u8]>,
        raw: &[u8],
    ) -> Result<Option<AttestationDocument>> {
        let (sign1, document) = decode_document(raw)?;

        if !self.chain_is_trusted(&document) {
            return Ok(None);
        }

        if !signature_is_valid(&sign1, &document.certificate) {
            debug!(module_id = %document.module_id, "attestation signature did not verify");
            return Ok(None);
        }

        if let Some(message) = message {
            let expected = Sha256::digest(message);
            if document.user_data.as_deref().map(|u| u.as_slice()) != Some(expected.as_slice()) {
                debug!(module_id = %document.module_id, "attestation user data does not match message");
                return Ok(None);
            }
        }

        Ok(Some(document))
    }

    fn chain_is_trusted(&self, document: &AttestationDocument) -> bool {
        let now = (self.now)().timestamp();

        match document.cabundle.first() {
            Some(root) if root.as_slice() == self.root_der.as_slice() => {}
            _ => {
                debug!(module_id = %document.module_id, "attestation root is not the pinned root");
                return false;
            }
        }

        let chain = document
            .cabundle
            .iter()
            .chain(std::iter::once(&document.certificate));
        let leaf_index = document.cabundle.len();

        let mut issuer: Option<X509Certificate<'_>> = None;
        for (index, der) in chain.enumerate() {
            let Ok((_, cert)) = parse_x509_certificate(der) else {
                debug!("attestation chain contains an unparseable certificate");
                return false;
            };

            let validity = cert.validity();
            if now < validity.not_before.timestamp() || now > validity.not_after.timestamp() {
                debug!(subject = %cert.subject(), "attestation certificate outside validity window");
                return false;
            }

            if let Some(issuer) = &issuer {
                if cert.issuer().as_raw() != issuer.subject().as_raw() {
                    debug!(subject = %cert.subject(), "attestation certificate issuer does not match its predecessor");
                    return false;
                }
            }

            let issuer_key = issuer
                .as_ref()
                .map(|i| i.public_key())
                .unwrap_or_else(|| cert.public_key());
            if cert.verify_signature(Some(issuer_key)).is_err() {
                debug!(subject = %cert.subject(), "attestation certificate signature did not verify");
                return false;
            }

            // CAs below this one, not counting the leaf
            if index < leaf_index && !may_issue(&cert, leaf_index - index - 1) {
                debug!(subject = %cert.subject(), "attestation chain contains a certificate that may not issue");
                return false;
            }

            issuer = Some(cert);
        }
        true
    }
}

/// True if `cert` is a CA allowed to sit above `cas_below` further CAs.
fn may_issue(cert: &X509Certificate<'_>, cas_below: usize) -> bool {
    let Ok(Some(constraints)) = cert.basic_constraints() else {
        return false;
    };
    if !constraints.value.ca {
        return false;
    }
    if let Some(path_len) = constraints.value.path_len_constraint {
        if cas_below > path_len as usize {
            return false;
        }
    }

    match cert.key_usage() {
        Ok(Some(usage)) => usage.value.key_cert_sign(),
        Ok(None) => true,
        Err(_) => false,
    }
}

impl fmt::Debug for EnclaveVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnclaveVerifier")
            .field("pcrs", &self.to_string())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EnclaveVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pcrs: Vec<String> = self
            .pcrs
            .iter()
            .map(|(index, value)| format!("{index}:{}", hex::encode(value)))
            .collect();
        write!(f, "awsnitro[{}]", pcrs.join(" "))
    }
}

impl Verifier for EnclaveVerifier {
    fn verify(&self, message: &[u8], sig: &[u8], _opts: &SignerOpts) -> Result<bool> {
        let Some(document) = self.verify_document(Some(message), sig)? else {
            return Ok(false);
        };

        if self.pcrs.is_empty() {
            debug!("no PCR expectations configured, refusing to verify");
            return Ok(false);
        }

        for (index, expected) in &self.pcrs {
            match document.pcrs.get(index) {
                Some(actual) if actual.as_slice() == expected.as_slice() => {}
                Some(_) => {
                    debug!(pcr = index, "pcr did not match");
                    return Ok(false);
                }
                None => {
                    debug!(pcr = index, "pcr was missing");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// DER of the AWS Nitro Enclaves root certificate.
pub fn aws_root_der() -> Result<Vec<u8>> {
    pem_to_der(AWS_NITRO_ROOT_PEM)
}

/// Decoded PCR1 expectation for official tooling.
pub fn expected_pcr1() -> Result<Vec<u8>> {
    hex::decode(EXPECTED_PCR1_HEX).map_err(|e| HttpSigError::config(format!("invalid PCR1 hex: {e}")))
}

pub(crate) fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let start_marker = "-----BEGIN CERTIFICATE-----";
    let end_marker = "-----END CERTIFICATE-----";

    let content = pem
        .trim()
        .strip_prefix(start_marker)
        .and_then(|s| s.strip_suffix(end_marker))
        .ok_or_else(|| HttpSigError::config("Invalid PEM format: expected CERTIFICATE markers"))?;
    let content: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(content)?)
}

fn decode_document(raw: &[u8]) -> Result<(CoseSign1, AttestationDocument)> {
    let sign1 = CoseSign1::from_slice(raw)
        .or_else(|_| CoseSign1::from_tagged_slice(raw))
        .map_err(|e| HttpSigError::attestation(format!("invalid COSE_Sign1 document: {e:?}")))?;

    let payload = sign1
        .payload
        .as_deref()
        .ok_or_else(|| HttpSigError::attestation("attestation document has no payload"))?;
    let document: AttestationDocument = ciborium::from_reader(payload)
        .map_err(|e| HttpSigError::attestation(format!("invalid attestation payload: {e}")))?;

    Ok((sign1, document))
}

fn signature_is_valid(sign1: &CoseSign1, leaf_der: &[u8]) -> bool {
    let es384 = RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES384);
    if sign1.protected.header.alg.as_ref() != Some(&es384) {
        return false;
    }

    let Ok((_, leaf)) = parse_x509_certificate(leaf_der) else {
        return false;
    };
    let public_key = UnparsedPublicKey::new(
        &ECDSA_P384_SHA384_FIXED,
        leaf.public_key().subject_public_key.data.to_vec(),
    );

    sign1
        .verify_signature(b"", |sig, data| public_key.verify(data, sig))
        .is_ok()
}


#[cfg(test)]
mod tests {
    use super::test_enclave::{ca_params, TestEnclave};
    use super::*;
    use chrono::TimeZone;
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyUsagePurpose};

    fn sign(enclave: &Arc<TestEnclave>, message: &[u8]) -> Vec<u8> {
        EnclaveSigner::new(enclave.clone())
            .sign(&mut rand::thread_rng(), message, &SignerOpts::default())
            .unwrap()
    }

    #[test]
    fn test_aws_root_is_self_signed_p384() {
        let der = aws_root_der().unwrap();
        let (_, cert) = parse_x509_certificate(&der).unwrap();
        assert!(cert.verify_signature(None).is_ok());
        assert!(cert.subject().to_string().contains("aws.nitro-enclaves"));
    }

    #[test]
    fn test_sign_verify() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"foo: bar");

        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_subset_of_pcrs_is_enough() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"foo: bar");

        let mut expected = BTreeMap::new();
        expected.insert(1, expected_pcr1().unwrap());
        let verifier = enclave.verifier(expected);
        assert!(verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_empty_expectations_rejected() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"foo: bar");

        let verifier = enclave.verifier(BTreeMap::new());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_pcr_mismatch_and_missing() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"foo: bar");

        let mut mismatched = enclave.pcrs.clone();
        mismatched.insert(2, vec![0x33u8; 48]);
        let verifier = enclave.verifier(mismatched);
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());

        let mut missing = enclave.pcrs.clone();
        missing.insert(8, vec![0u8; 48]);
        let verifier = enclave.verifier(missing);
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_user_data_binds_message() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"foo: bar");

        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: baz", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_untrusted_root_rejected() {
        let enclave = Arc::new(TestEnclave::new());
        let other = TestEnclave::new();
        let doc = sign(&enclave, b"foo: bar");

        let verifier = other.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());

        // the real AWS root does not trust the test chain either
        let verifier = EnclaveVerifier::new(enclave.pcrs.clone()).unwrap();
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_expired_chain_rejected() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"foo: bar");

        let far_future = Utc.with_ymd_and_hms(5000, 1, 1, 0, 0, 0).unwrap();
        let verifier = enclave
            .verifier(enclave.pcrs.clone())
            .with_clock(Arc::new(move || far_future));
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_end_entity_cannot_issue_leaf() {
        let mut not_ca = CertificateParams::new(Vec::<String>::new()).unwrap();
        not_ca.distinguished_name.push(DnType::CommonName, "Ordinary Service");
        not_ca.is_ca = IsCa::ExplicitNoCa;
        let enclave = Arc::new(TestEnclave::from_params(
            ca_params("Test Nitro Root", BasicConstraints::Unconstrained),
            not_ca,
        ));
        let doc = sign(&enclave, b"foo: bar");

        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());

        // without basicConstraints at all the certificate is no CA either
        let mut unmarked = CertificateParams::new(Vec::<String>::new()).unwrap();
        unmarked.is_ca = IsCa::NoCa;
        let enclave = Arc::new(TestEnclave::from_params(
            ca_params("Test Nitro Root", BasicConstraints::Unconstrained),
            unmarked,
        ));
        let doc = sign(&enclave, b"foo: bar");
        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_root_path_length_enforced() {
        let enclave = Arc::new(TestEnclave::from_params(
            ca_params("Test Nitro Root", BasicConstraints::Constrained(0)),
            ca_params("Test Nitro Intermediate", BasicConstraints::Unconstrained),
        ));
        let doc = sign(&enclave, b"foo: bar");
        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());

        let enclave = Arc::new(TestEnclave::from_params(
            ca_params("Test Nitro Root", BasicConstraints::Constrained(1)),
            ca_params("Test Nitro Intermediate", BasicConstraints::Constrained(0)),
        ));
        let doc = sign(&enclave, b"foo: bar");
        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_intermediate_key_usage_must_allow_cert_signing() {
        let mut signing_only = ca_params("Test Nitro Intermediate", BasicConstraints::Unconstrained);
        signing_only.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        let enclave = Arc::new(TestEnclave::from_params(
            ca_params("Test Nitro Root", BasicConstraints::Unconstrained),
            signing_only,
        ));
        let doc = sign(&enclave, b"foo: bar");
        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());

        let mut cert_signing = ca_params("Test Nitro Intermediate", BasicConstraints::Unconstrained);
        cert_signing.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
        let enclave = Arc::new(TestEnclave::from_params(
            ca_params("Test Nitro Root", BasicConstraints::Unconstrained),
            cert_signing,
        ));
        let doc = sign(&enclave, b"foo: bar");
        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_issuer_name_must_match_predecessor() {
        let mut enclave = TestEnclave::new();
        // same key, so the leaf signature still verifies against it
        enclave.reissue_intermediate(ca_params("Renamed Intermediate", BasicConstraints::Unconstrained));
        let enclave = Arc::new(enclave);
        let doc = sign(&enclave, b"foo: bar");

        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_tampered_document_rejected() {
        let enclave = Arc::new(TestEnclave::new());
        let mut doc = sign(&enclave, b"foo: bar");
        // last byte sits inside the COSE signature
        let last = doc.len() - 1;
        doc[last] ^= 0x01;

        let verifier = enclave.verifier(enclave.pcrs.clone());
        assert!(!verifier.verify(b"foo: bar", &doc, &SignerOpts::default()).unwrap());
    }

    #[test]
    fn test_garbage_document_is_error() {
        let enclave = TestEnclave::new();
        let verifier = enclave.verifier(enclave.pcrs.clone());
        let err = verifier
            .verify(b"foo: bar", b"not cbor at all", &SignerOpts::default())
            .unwrap_err();
        assert!(matches!(err, HttpSigError::Attestation(_)));
    }

    #[test]
    fn test_document_pcrs() {
        let enclave = Arc::new(TestEnclave::new());
        let doc = sign(&enclave, b"");

        let verifier = enclave.verifier(BTreeMap::new());
        assert_eq!(verifier.document_pcrs(&doc).unwrap(), enclave.pcrs);
    }

    #[test]
    fn test_display_lists_expected_pcrs() {
        let mut pcrs = BTreeMap::new();
        pcrs.insert(2, vec![0xab, 0xcd]);
        let verifier = EnclaveVerifier::with_root_der(Vec::new(), pcrs);
        assert_eq!(verifier.to_string(), "awsnitro[2:abcd]");
    }
}
