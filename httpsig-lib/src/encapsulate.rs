//! JSON encapsulation of signed messages
//!
//! A signed request or response can be relayed across a trust boundary as a
//! JSON envelope and verified on the far side as if it had arrived directly:
//!
//! ```json
//! { "headers": {"digest": "...", "signature": "...", "foo": "bar"}, "octets": "..." }
//! ```
//!
//! Only the headers covered by the message's own `Signature` header (plus the
//! signature itself) are carried. `(request-target)` is stored as its
//! pseudo-header value and `digest` as the header's current value, never
//! recomputed. Responses add a `statusCode` field.

use crate::error::{HttpSigError, Result};
use crate::message::{joined_header_value, resolve_host, HttpMessage, RequestTarget};
use crate::params::{
    signature_from_headers, SignatureParams, HOST_HEADER, REQUEST_TARGET_HEADER, SIGNATURE_HEADER,
};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A signed request in envelope form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncapsulatedRequest {
    pub headers: BTreeMap<String, String>,
    pub octets: String,
}

/// A signed response in envelope form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncapsulatedResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub octets: String,
}

impl EncapsulatedRequest {
    pub fn encapsulate<B: AsRef<[u8]>>(req: &Request<B>) -> Result<Self> {
        let (headers, octets) = encapsulate_message(req)?;
        Ok(Self { headers, octets })
    }

    /// Rebuild the request and return the parameters its signature claims.
    pub fn extract(&self) -> Result<(Request<Vec<u8>>, SignatureParams)> {
        let mut req = Request::new(self.octets.clone().into_bytes());
        if let Some(value) = self.headers.get(REQUEST_TARGET_HEADER) {
            let target = RequestTarget::parse(value)?;
            *req.method_mut() = target.method;
            *req.uri_mut() = target.uri;
        }
        copy_headers(&self.headers, req.headers_mut())?;

        let params = signature_from_headers(req.headers())?.params;
        Ok((req, params))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl EncapsulatedResponse {
    /// A `(request-target)` is only carried if the response has a
    /// `RequestTarget` extension.
    pub fn encapsulate<B: AsRef<[u8]>>(resp: &Response<B>) -> Result<Self> {
        let (headers, octets) = encapsulate_message(resp)?;
        Ok(Self {
            status_code: resp.status().as_u16(),
            headers,
            octets,
        })
    }

    /// Rebuild the response and return the parameters its signature claims.
    pub fn extract(&self) -> Result<(Response<Vec<u8>>, SignatureParams)> {
        let status = StatusCode::from_u16(self.status_code).map_err(|e| {
            HttpSigError::malformed(format!("invalid encapsulated status code: {e}"))
        })?;

        let mut resp = Response::new(self.octets.clone().into_bytes());
        *resp.status_mut() = status;
        if let Some(value) = self.headers.get(REQUEST_TARGET_HEADER) {
            resp.extensions_mut().insert(RequestTarget::parse(value)?);
        }
        copy_headers(&self.headers, resp.headers_mut())?;

        let params = signature_from_headers(resp.headers())?.params;
        Ok((resp, params))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn encapsulate_message<M: HttpMessage + ?Sized>(
    message: &M,
) -> Result<(BTreeMap<String, String>, String)> {
    let signature = signature_from_headers(message.headers())?;

    let mut headers = BTreeMap::new();
    for name in signature.params.covered_headers() {
        let value = match name {
            REQUEST_TARGET_HEADER => match message.request_target() {
                Some(target) => target.pseudo_header_value(),
                None => {
                    return Err(HttpSigError::missing_context(format!(
                        "request must be present to encapsulate the {REQUEST_TARGET_HEADER} pseudo-header"
                    )))
                }
            },
            HOST_HEADER => header_text(name, resolve_host(message)?)?,
            other => match joined_header_value(message.headers(), other) {
                Some(value) => header_text(other, value)?,
                None => continue,
            },
        };
        headers.insert(name.to_string(), value);
    }

    // present, and therefore visible ASCII, since the parse above succeeded
    let raw_signature = message
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    headers.insert(SIGNATURE_HEADER.to_string(), raw_signature.to_string());

    let octets = String::from_utf8(message.body().to_vec()).map_err(|_| {
        HttpSigError::malformed("body is not valid UTF-8 and cannot be encapsulated")
    })?;

    Ok((headers, octets))
}

fn header_text(name: &str, value: Vec<u8>) -> Result<String> {
    String::from_utf8(value)
        .map_err(|_| HttpSigError::malformed(format!("header {name} is not valid UTF-8")))
}

fn copy_headers(from: &BTreeMap<String, String>, to: &mut HeaderMap) -> Result<()> {
    for (name, value) in from {
        if name == REQUEST_TARGET_HEADER {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            HttpSigError::malformed(format!("invalid encapsulated header name: {name:?}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            HttpSigError::malformed(format!("invalid encapsulated header value for {name}"))
        })?;
        to.insert(name, value);
    }
    Ok(())
}
