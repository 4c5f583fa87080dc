//! End-to-end signing and verification through the public API.
//!
//! Covers the published vectors for Ed25519, HMAC-SHA-512 and body digests,
//! keystore verification with pinned parameters, and tamper detection on
//! bodies and headers.

use base64::prelude::*;
use httpsig_lib::{
    Algorithm, Ed25519PrivateKey, Ed25519PublicKey, HmacKey, HttpSigError, KeyIdentity,
    MemoryKeystore, ParameterizedKeystoreVerifier, ParameterizedSignator, Signature,
    SignatureParams, SignerOpts, StaticKeystore, Verifier,
};
use http::{Request, Response};
use std::sync::Arc;

// ── Fixtures ─────────────────────────────────────────────────────────────────

const PRIV_HEX: &str = "96aa9ec42242a9a62196281045705196a64e12b15e9160bbb630e38385b82700e7876fd5cc3a228dad634816f4ec4b80a258b2a552467e5d26f30003211bc45d";
const PUB_HEX: &str = "e7876fd5cc3a228dad634816f4ec4b80a258b2a552467e5d26f30003211bc45d";

const FOO_SIG: &str = "RbGSX1MttcKCpCkq9nsPGkdJGUZsAU+0TpiXJYkwde+0ZwxEp9dXO3v17DwyGLXjv385253RdGI7URbrI7J6DQ==";
const HS2019_SIG: &str = "q4hNevLfEiHZVCNUCkfxv89YFdpujD3FHfQUQSRnZPmRnakArWlv/KQRsRvmxL9xamS68KePztm1O+CvjIoX1Q==";
const BODY_SIG: &str = "HvrmTu+A96H46IPZAYC2rmqRSgmgUgCcyPcnCikX0eGPSC6Va5jyr3blRLjpbGk6UMJ1FXckdWFnJxkt36gkBA==";
const BODY_DIGEST: &str = "SHA-256=RK/0qy18MlBSVnWgjwz6lZEWjP/lF5HF9bvEF8FabDg=";
const BODY: &[u8] = b"{\"hello\": \"world\"}\n";

// ── Helpers ──────────────────────────────────────────────────────────────────

fn ed25519_signator(headers: &[&str]) -> ParameterizedSignator {
    ParameterizedSignator::new(
        SignatureParams::new(Algorithm::Ed25519, "primary").with_headers(headers.iter().copied()),
        Arc::new(Ed25519PrivateKey::from_hex(PRIV_HEX).unwrap()),
    )
}

fn get(uri: &str, body: &[u8]) -> Request<Vec<u8>> {
    Request::get(uri)
        .header("foo", "bar")
        .body(body.to_vec())
        .unwrap()
}

fn wire_signature<B>(req: &Request<B>) -> Signature {
    req.headers()["signature"].to_str().unwrap().parse().unwrap()
}

fn pinned(algorithm: Algorithm, headers: &[&str]) -> SignatureParams {
    SignatureParams::new(algorithm, "").with_headers(headers.iter().copied())
}

// ── Known vectors ────────────────────────────────────────────────────────────

#[test]
fn test_ed25519_vector() {
    let mut req = get("http://example.org/foo", b"");
    ed25519_signator(&["foo"]).sign_request(&mut req).unwrap();

    let s = wire_signature(&req);
    assert_eq!(s.sig, FOO_SIG);
    assert_eq!(s.params.key_id, "primary");
    assert_eq!(s.params.algorithm, Algorithm::Ed25519);
    assert_eq!(s.params.headers, vec!["foo"]);
}

#[test]
fn test_hs2019_vector() {
    let signator = ParameterizedSignator::new(
        SignatureParams::new(Algorithm::Hs2019, "secondary")
            .with_headers(["(request-target)", "foo"]),
        Arc::new(HmacKey::new(PRIV_HEX)),
    );
    let mut req = get("http://example.org/foo2", b"");
    signator.sign_request(&mut req).unwrap();

    assert_eq!(wire_signature(&req).sig, HS2019_SIG);
}

#[test]
fn test_body_digest_vector() {
    let mut req = get("http://example.org/foo", BODY);
    ed25519_signator(&["digest", "foo"]).sign_request(&mut req).unwrap();

    assert_eq!(req.headers()["digest"], BODY_DIGEST);
    assert_eq!(wire_signature(&req).sig, BODY_SIG);
}

#[test]
fn test_response_vector() {
    let mut resp = Response::builder()
        .header("foo", "bar")
        .body(BODY.to_vec())
        .unwrap();
    ed25519_signator(&["digest", "foo"]).sign_response(&mut resp).unwrap();

    assert_eq!(resp.headers()["digest"], BODY_DIGEST);
    let s: Signature = resp.headers()["signature"].to_str().unwrap().parse().unwrap();
    assert_eq!(s.sig, BODY_SIG);
}

#[test]
fn test_bytes_body_matches_vec_body() {
    let mut req = Request::get("http://example.org/foo")
        .header("foo", "bar")
        .body(bytes::Bytes::from_static(BODY))
        .unwrap();
    ed25519_signator(&["digest", "foo"]).sign_request(&mut req).unwrap();
    assert_eq!(wire_signature(&req).sig, BODY_SIG);
}

// ── Static key verification ──────────────────────────────────────────────────

#[test]
fn test_verify_with_static_key() {
    let public_key = Ed25519PublicKey::from_hex(PUB_HEX).unwrap();
    let opts = SignerOpts::default();

    // the wire claims `digest`; the caller's pinned `foo` governs
    let mut req = get("http://example.org/foo", b"");
    req.headers_mut().insert(
        "signature",
        format!("keyId=\"primary\",algorithm=\"ed25519\",headers=\"digest\",signature=\"{FOO_SIG}\"")
            .parse()
            .unwrap(),
    );
    assert!(pinned(Algorithm::Ed25519, &["foo"])
        .verify_message(&public_key, &opts, &mut req)
        .unwrap());

    // a bogus signature of plausible size is invalid, not an error
    let bogus = "x".repeat(88);
    req.headers_mut().insert(
        "signature",
        format!("keyId=\"primary\",algorithm=\"ed25519\",headers=\"digest\",signature=\"{bogus}\"")
            .parse()
            .unwrap(),
    );
    assert!(!pinned(Algorithm::Ed25519, &["foo"])
        .verify_message(&public_key, &opts, &mut req)
        .unwrap());
}

#[test]
fn test_verify_hmac_with_static_key() {
    let key = HmacKey::new("yyqz64U$eG?eUAp24Pm!Fn!Cn");
    let mut req = get("http://example.org/foo2", b"");
    req.headers_mut().insert(
        "signature",
        "keyId=\"secondary\",algorithm=\"hs2019\",headers=\"digest\",signature=\"3RCLz6TH2I32nj1NY5YaUWDSCNPiKsAVIXjX4merDeNvrGondy7+f3sWQQJWRwEo90FCrthWrrVcgHqqFevS9Q==\""
            .parse()
            .unwrap(),
    );
    assert!(pinned(Algorithm::Hs2019, &["foo"])
        .verify_message(&key, &SignerOpts::default(), &mut req)
        .unwrap());
}

#[test]
fn test_short_public_key_is_error() {
    let short = Ed25519PublicKey::new(hex::decode(&PUB_HEX[..62]).unwrap());
    let mut req = get("http://example.org/foo", b"");
    ed25519_signator(&["foo"]).sign_request(&mut req).unwrap();

    let err = pinned(Algorithm::Ed25519, &["foo"])
        .verify_message(&short, &SignerOpts::default(), &mut req)
        .unwrap_err();
    assert!(matches!(err, HttpSigError::BadKeyMaterial(_)));
}

// ── Tampering ────────────────────────────────────────────────────────────────

#[test]
fn test_body_tampering_detected() {
    let public_key = Ed25519PublicKey::from_hex(PUB_HEX).unwrap();
    let params = pinned(Algorithm::Ed25519, &["digest", "foo"]);

    let mut req = get("http://example.org/foo", BODY);
    ed25519_signator(&["digest", "foo"]).sign_request(&mut req).unwrap();
    assert!(params
        .verify_message(&public_key, &SignerOpts::default(), &mut req)
        .unwrap());

    *req.body_mut() = b"{\"world\": \"hello\"}\n".to_vec();
    assert!(!params
        .verify_message(&public_key, &SignerOpts::default(), &mut req)
        .unwrap());
}

#[test]
fn test_every_body_byte_is_covered() {
    let public_key = Ed25519PublicKey::from_hex(PUB_HEX).unwrap();
    let params = pinned(Algorithm::Ed25519, &["digest"]);

    let mut signed = get("http://example.org/foo", BODY);
    ed25519_signator(&["digest"]).sign_request(&mut signed).unwrap();

    for i in 0..BODY.len() {
        let mut req = signed.clone();
        req.body_mut()[i] ^= 0x01;
        assert!(
            !params
                .verify_message(&public_key, &SignerOpts::default(), &mut req)
                .unwrap(),
            "flipping body byte {i} went unnoticed"
        );
    }
}

#[test]
fn test_header_tampering_detected() {
    let public_key = Ed25519PublicKey::from_hex(PUB_HEX).unwrap();
    let params = pinned(Algorithm::Ed25519, &["(request-target)", "host", "foo"]);

    let mut req = get("http://example.org/foo", b"");
    req.headers_mut().insert("host", "example.org".parse().unwrap());
    ed25519_signator(&["(request-target)", "host", "foo"])
        .sign_request(&mut req)
        .unwrap();

    let mut changed_header = req.clone();
    changed_header.headers_mut().insert("foo", "baz".parse().unwrap());
    assert!(!params
        .verify_message(&public_key, &SignerOpts::default(), &mut changed_header)
        .unwrap());

    let mut changed_path = req.clone();
    *changed_path.uri_mut() = "http://example.org/other".parse().unwrap();
    assert!(!params
        .verify_message(&public_key, &SignerOpts::default(), &mut changed_path)
        .unwrap());

    let mut forwarded = req.clone();
    forwarded
        .headers_mut()
        .insert("x-forwarded-host", "evil.example".parse().unwrap());
    assert!(!params
        .verify_message(&public_key, &SignerOpts::default(), &mut forwarded)
        .unwrap());

    assert!(params
        .verify_message(&public_key, &SignerOpts::default(), &mut req)
        .unwrap());
}

// ── Keystore ─────────────────────────────────────────────────────────────────

fn keystore() -> Arc<MemoryKeystore> {
    let keystore = MemoryKeystore::new();
    keystore.insert("primary", Arc::new(Ed25519PublicKey::from_hex(PUB_HEX).unwrap()));
    keystore.insert("secondary", Arc::new(HmacKey::new(PRIV_HEX)));
    Arc::new(keystore)
}

#[test]
fn test_keystore_round_trip() {
    let verifier = ParameterizedKeystoreVerifier::new(
        pinned(Algorithm::Ed25519, &["digest", "foo"]),
        keystore(),
    );

    let mut req = get("http://example.org/foo", BODY);
    ed25519_signator(&["digest", "foo"]).sign_request(&mut req).unwrap();

    let verified = verifier.verify_request(&mut req).unwrap();
    assert_eq!(verified.key_id, "primary");
    assert_eq!(
        verified.context.get::<KeyIdentity>().map(|k| k.0.as_str()),
        Some("primary")
    );
}

#[test]
fn test_keystore_distinguishes_unknown_key_from_bad_signature() {
    let verifier = ParameterizedKeystoreVerifier::new(pinned(Algorithm::Ed25519, &["foo"]), keystore());

    let mut req = get("http://example.org/foo", b"");
    ed25519_signator(&["foo"]).sign_request(&mut req).unwrap();
    let mut claimed = wire_signature(&req);

    claimed.params.key_id = "unknown".to_string();
    req.headers_mut()
        .insert("signature", claimed.marshal().unwrap().parse().unwrap());
    assert!(matches!(
        verifier.verify_request(&mut req),
        Err(HttpSigError::KeyResolution(_))
    ));

    claimed.params.key_id = "primary".to_string();
    claimed.sig = BASE64_STANDARD.encode([0u8; 64]);
    req.headers_mut()
        .insert("signature", claimed.marshal().unwrap().parse().unwrap());
    assert!(matches!(
        verifier.verify_request(&mut req),
        Err(HttpSigError::SignatureInvalid)
    ));
}

#[test]
fn test_keystore_pins_algorithm() {
    // HMAC verifier for "secondary", but the pinned algorithm is what runs
    let verifier = ParameterizedKeystoreVerifier::new(
        pinned(Algorithm::Hs2019, &["(request-target)", "foo"]),
        keystore(),
    );

    let mut req = get("http://example.org/foo2", b"");
    req.headers_mut().insert(
        "signature",
        format!("keyId=\"secondary\",algorithm=\"ed25519\",headers=\"foo\",signature=\"{HS2019_SIG}\"")
            .parse()
            .unwrap(),
    );
    assert_eq!(verifier.verify_request(&mut req).unwrap().key_id, "secondary");
}

#[test]
fn test_keystore_verifies_responses() {
    let verifier = ParameterizedKeystoreVerifier::new(
        pinned(Algorithm::Ed25519, &["digest", "foo"]),
        Arc::new(StaticKeystore::new(Arc::new(
            Ed25519PublicKey::from_hex(PUB_HEX).unwrap(),
        ))),
    );

    let mut resp = Response::builder()
        .header("foo", "bar")
        .body(BODY.to_vec())
        .unwrap();
    ed25519_signator(&["digest", "foo"]).sign_response(&mut resp).unwrap();
    assert_eq!(verifier.verify_response(&mut resp).unwrap().key_id, "primary");
}

#[test]
fn test_concurrent_verification() {
    let verifier = Arc::new(ParameterizedKeystoreVerifier::new(
        pinned(Algorithm::Ed25519, &["digest", "foo"]),
        keystore(),
    ));
    let signator = Arc::new(ed25519_signator(&["digest", "foo"]));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let verifier = verifier.clone();
            let signator = signator.clone();
            std::thread::spawn(move || {
                let body = format!("{{\"n\": {i}}}");
                let mut req = get("http://example.org/foo", body.as_bytes());
                signator.sign_request(&mut req).unwrap();
                verifier.verify_request(&mut req).unwrap().key_id
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "primary");
    }
}

#[test]
fn test_verifier_display_is_stable() {
    let public_key = Ed25519PublicKey::from_hex(PUB_HEX).unwrap();
    assert_eq!(public_key.to_string(), PUB_HEX);
    let hmac: Arc<dyn Verifier> = Arc::new(HmacKey::new("secret"));
    assert!(hmac.to_string().starts_with("hmac-sha512:"));
    assert!(!hmac.to_string().contains("secret"));
}
