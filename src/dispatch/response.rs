use crate::{MockError, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// A predetermined response returned for a dispatched request
///
/// # Examples
///
/// ```
/// use mocksrv::CannedResponse;
/// use http::StatusCode;
///
/// let response = CannedResponse::ok("Hello, World!");
/// assert_eq!(response.status, StatusCode::OK);
/// assert_eq!(&response.body[..], b"Hello, World!");
///
/// let missing = CannedResponse::not_found();
/// assert_eq!(missing.status, StatusCode::NOT_FOUND);
/// assert!(missing.body.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    /// Status code written on the status line
    pub status: StatusCode,
    /// Extra headers; `Content-Length` and `Connection` are managed by the codec
    pub headers: HeaderMap,
    /// Response body, possibly empty
    pub body: Bytes,
}

impl CannedResponse {
    /// Creates a response with the given status and an empty body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a response from a numeric status code
    pub fn from_code(code: u16) -> Result<Self> {
        StatusCode::from_u16(code)
            .map(Self::new)
            .map_err(|e| MockError::Config(format!("Invalid status code {code}: {e}")))
    }

    /// `200 OK` with the given body
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    /// Default response for paths without a rule
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// Default response for requests that cannot be parsed
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    /// Default response for requests over the size limit
    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE)
    }

    /// Response for connections refused over the connection cap
    pub fn service_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

impl Default for CannedResponse {
    fn default() -> Self {
        Self::not_found()
    }
}
