//! Abstract HTTP message used as canonicalization input
//!
//! Signing and verification operate on anything that exposes a header map,
//! a fully buffered body and (for requests) the request line. The trait is
//! implemented for `http::Request<B>` and `http::Response<B>` with any
//! buffered body type.

use crate::error::{HttpSigError, Result};
use http::{HeaderMap, Method, Request, Response, Uri};

/// Header carrying the original host when behind a reverse proxy
pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

/// Method and URI of the request a message belongs to.
///
/// Requests carry it in their request line. A response only has one if the
/// caller inserted it into the response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub method: Method,
    pub uri: Uri,
}

impl RequestTarget {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri }
    }

    /// Path and query, `/` when the URI has no path.
    pub fn request_uri(&self) -> &str {
        match self.uri.path_and_query().map(|pq| pq.as_str()) {
            Some(pq) if !pq.is_empty() => pq,
            _ => "/",
        }
    }

    /// Value of the `(request-target)` pseudo-header: `<method> <path?query>`
    /// with the method lower-cased.
    pub fn pseudo_header_value(&self) -> String {
        format!(
            "{} {}",
            self.method.as_str().to_ascii_lowercase(),
            self.request_uri()
        )
    }

    /// Parse a `(request-target)` value back into a method and URI.
    pub fn parse(value: &str) -> Result<Self> {
        let (method, uri) = value.split_once(' ').ok_or_else(|| {
            HttpSigError::malformed("invalid encapsulated (request-target) pseudo-header value")
        })?;
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|e| {
            HttpSigError::malformed(format!("invalid (request-target) method: {e}"))
        })?;
        let uri: Uri = uri.parse().map_err(|e| {
            HttpSigError::malformed(format!("invalid (request-target) uri: {e}"))
        })?;
        Ok(Self { method, uri })
    }

    /// `host[:port]` from the URI authority, if the URI is absolute.
    pub fn authority_host(&self) -> Option<String> {
        let authority = self.uri.authority()?;
        Some(match authority.port() {
            Some(port) => format!("{}:{}", authority.host(), port),
            None => authority.host().to_string(),
        })
    }
}

/// A request or response that can be canonicalized.
pub trait HttpMessage {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Request context, `None` for a response that was never tied to a request.
    fn request_target(&self) -> Option<RequestTarget>;

    /// The fully buffered body.
    fn body(&self) -> &[u8];
}

impl<B: AsRef<[u8]>> HttpMessage for Request<B> {
    fn headers(&self) -> &HeaderMap {
        Request::headers(self)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        Request::headers_mut(self)
    }

    fn request_target(&self) -> Option<RequestTarget> {
        Some(RequestTarget::new(self.method().clone(), self.uri().clone()))
    }

    fn body(&self) -> &[u8] {
        Request::body(self).as_ref()
    }
}

impl<B: AsRef<[u8]>> HttpMessage for Response<B> {
    fn headers(&self) -> &HeaderMap {
        Response::headers(self)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        Response::headers_mut(self)
    }

    fn request_target(&self) -> Option<RequestTarget> {
        self.extensions().get::<RequestTarget>().cloned()
    }

    fn body(&self) -> &[u8] {
        Response::body(self).as_ref()
    }
}

/// All values of a header joined with `", "`, `None` if the header is absent.
pub(crate) fn joined_header_value(headers: &HeaderMap, name: &str) -> Option<Vec<u8>> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;

    let mut out = Vec::new();
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.extend_from_slice(b", ");
        }
        out.extend_from_slice(value.as_bytes());
    }
    Some(out)
}

/// Host as seen by the client: forwarded host, else `Host`, else the URI
/// authority. Requires request context.
pub(crate) fn resolve_host<M: HttpMessage + ?Sized>(message: &M) -> Result<Vec<u8>> {
    let target = message
        .request_target()
        .ok_or_else(|| HttpSigError::missing_context("request must be present to use the host header"))?;

    if let Some(forwarded) = joined_header_value(message.headers(), FORWARDED_HOST_HEADER) {
        return Ok(forwarded);
    }
    if let Some(host) = joined_header_value(message.headers(), http::header::HOST.as_str()) {
        return Ok(host);
    }
    Ok(target.authority_host().unwrap_or_default().into_bytes())
}
