//! Response signing at write time
//!
//! `SigningResponseWriter` buffers the status code and headers until the body
//! is written, signs over the buffered headers plus that body, then flushes
//! everything to the wrapped writer:
//!
//! ```text
//! Idle --write_header--> HeaderSet --write_header--> HeaderSet
//!   |                        |
//!   +-------write------------+------write--> Written
//! ```
//!
//! The response is signed without request context, so `(request-target)` and
//! `host` cannot be covered.

use crate::error::{HttpSigError, Result};
use crate::message::{HttpMessage, RequestTarget};
use crate::params::{DIGEST_HEADER, SIGNATURE_HEADER};
use crate::signator::ParameterizedSignator;
use http::{HeaderMap, Response, StatusCode};
use tracing::debug;

/// Minimal response sink: headers, a status line and one body write.
pub trait ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted.
    fn write(&mut self, body: &[u8]) -> Result<usize>;
}

/// Collects a written response into an `http::Response<Vec<u8>>`.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    response: Response<Vec<u8>>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_response(self) -> Response<Vec<u8>> {
        self.response
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.response.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        *self.response.status_mut() = status;
    }

    fn write(&mut self, body: &[u8]) -> Result<usize> {
        self.response.body_mut().extend_from_slice(body);
        Ok(body.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    HeaderSet(StatusCode),
    Written,
}

/// Signs a response when its body is written.
pub struct SigningResponseWriter<W> {
    inner: W,
    signator: ParameterizedSignator,
    headers: HeaderMap,
    state: State,
}

impl<W: ResponseWriter> SigningResponseWriter<W> {
    pub fn new(inner: W, signator: ParameterizedSignator) -> Self {
        Self {
            inner,
            signator,
            headers: HeaderMap::new(),
            state: State::Idle,
        }
    }

    /// Headers buffered so far (includes `Signature`/`Digest` once written).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_written(&self) -> bool {
        self.state == State::Written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for SigningResponseWriter<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.state {
            State::Idle | State::HeaderSet(_) => self.state = State::HeaderSet(status),
            State::Written => debug!(%status, "status ignored, response already written"),
        }
    }

    fn write(&mut self, body: &[u8]) -> Result<usize> {
        let status = match self.state {
            State::Idle => StatusCode::OK,
            State::HeaderSet(status) => status,
            State::Written => return Err(HttpSigError::malformed("response already written")),
        };

        let mut pending = PendingResponse {
            headers: &mut self.headers,
            body,
        };
        self.signator.sign_message(&mut pending)?;
        self.state = State::Written;

        let out = self.inner.headers_mut();
        // the fresh signature and digest replace anything the inner writer held
        for name in [SIGNATURE_HEADER, DIGEST_HEADER] {
            if self.headers.contains_key(name) {
                out.remove(name);
            }
        }
        for (name, value) in self.headers.iter() {
            out.append(name.clone(), value.clone());
        }
        self.inner.write_header(status);
        self.inner.write(body)
    }
}

/// Buffered headers plus the body being written, with no request context.
struct PendingResponse<'a> {
    headers: &'a mut HeaderMap,
    body: &'a [u8],
}

impl HttpMessage for PendingResponse<'_> {
    fn headers(&self) -> &HeaderMap {
        self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.headers
    }

    fn request_target(&self) -> Option<RequestTarget> {
        None
    }

    fn body(&self) -> &[u8] {
        self.body
    }
}
