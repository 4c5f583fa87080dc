//! Signature header codec
//!
//! Wire form:
//!
//! ```text
//! keyId="<id>",algorithm="<token>"[,headers="<name> <name> ..."],signature="<base64>"
//! ```
//!
//! Parsing is a tolerant pattern match over `key="value"` pairs, so a leading
//! `Signature ` scheme token or odd spacing is ignored. When a key repeats,
//! the first occurrence wins and later ones are not interpreted.

use crate::algorithm::Algorithm;
use crate::error::{HttpSigError, Result};
use crate::params::SignatureParams;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

static SIGNATURE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)="([^"]*)""#).expect("signature pair pattern is valid")
});

/// Parsed or to-be-marshalled value of a `Signature` header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub params: SignatureParams,
    /// Base64 of the raw signature bytes
    pub sig: String,
}

impl Signature {
    /// Render the header value.
    pub fn marshal(&self) -> Result<String> {
        if self.params.is_malformed() {
            return Err(HttpSigError::malformed("not a valid Algorithm"));
        }
        if self.params.key_id.is_empty() {
            return Err(HttpSigError::malformed("keyId must not be empty"));
        }
        if self.params.key_id.contains('"') {
            return Err(HttpSigError::malformed("keyId must not contain '\"'"));
        }

        let algorithm = self.params.algorithm.token()?;
        let headers = if self.params.headers.is_empty() {
            String::new()
        } else {
            format!(",headers=\"{}\"", self.params.headers.join(" "))
        };

        Ok(format!(
            "keyId=\"{}\",algorithm=\"{}\"{},signature=\"{}\"",
            self.params.key_id, algorithm, headers, self.sig
        ))
    }
}

impl FromStr for Signature {
    type Err = HttpSigError;

    fn from_str(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(HttpSigError::header_parse("signature header is empty"));
        }

        let mut key_id: Option<String> = None;
        let mut algorithm: Option<Algorithm> = None;
        let mut headers: Option<Vec<String>> = None;
        let mut sig: Option<String> = None;

        for caps in SIGNATURE_PAIR.captures_iter(text) {
            let key = &caps[1];
            let value = &caps[2];

            match key {
                "keyId" => {
                    key_id.get_or_insert_with(|| value.to_string());
                }
                "algorithm" => {
                    if algorithm.is_none() {
                        algorithm = Some(value.parse()?);
                    }
                }
                "headers" => {
                    headers.get_or_insert_with(|| {
                        value.split(' ').filter(|h| !h.is_empty()).map(String::from).collect()
                    });
                }
                "signature" => {
                    sig.get_or_insert_with(|| value.to_string());
                }
                other => {
                    return Err(HttpSigError::header_parse(format!(
                        "invalid key in signature: {other}"
                    )))
                }
            }
        }

        let (Some(algorithm), Some(key_id), Some(sig)) = (algorithm, key_id, sig) else {
            return Err(HttpSigError::header_parse(
                "a valid signature MUST have algorithm, keyId, and signature keys",
            ));
        };
        if key_id.is_empty() || sig.is_empty() {
            return Err(HttpSigError::header_parse(
                "a valid signature MUST have algorithm, keyId, and signature keys",
            ));
        }

        Ok(Signature {
            params: SignatureParams {
                algorithm,
                key_id,
                digest_algorithm: None,
                headers: headers.unwrap_or_default(),
            },
            sig,
        })
    }
}
