use crate::dispatch::CannedResponse;
use crate::record::RecordedRequest;
use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Version;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

const MAX_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Incomplete response: {0}")]
    IncompleteResponse(String),
    #[error("Request too large: {actual} bytes, max allowed: {max}")]
    TooLarge { actual: usize, max: usize },
}

impl HttpProtocolError {
    /// Error-class response sent back in place of a dispatched one
    pub fn response(&self) -> CannedResponse {
        match self {
            HttpProtocolError::TooLarge { .. } => CannedResponse::payload_too_large(),
            _ => CannedResponse::bad_request(),
        }
    }
}

/// A fully read request, head and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    pub method: String,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whether the connection may serve another request afterwards
    pub keep_alive: bool,
}

impl DecodedRequest {
    /// Converts into a journal record; the sequence is assigned on record
    pub fn into_record(self) -> RecordedRequest {
        RecordedRequest {
            sequence: 0,
            method: self.method,
            path: self.target,
            version: self.version,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// A response ready to be written
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub response: CannedResponse,
    /// Write headers only (`HEAD` requests)
    pub omit_body: bool,
    /// Announce and perform connection close after this response
    pub close: bool,
}

#[derive(Debug)]
struct PendingHead {
    method: String,
    target: String,
    version: Version,
    headers: HeaderMap,
    content_length: usize,
    keep_alive: bool,
}

/// HTTP/1.1 request decoder and response encoder
///
/// Bodies are framed by `Content-Length` only; chunked request bodies are
/// rejected as invalid.
#[derive(Debug)]
pub struct HttpCodec {
    max_request_size: usize,
    server_name: Option<HeaderValue>,
    pending: Option<PendingHead>,
}

impl HttpCodec {
    pub fn new(max_request_size: usize, server_name: Option<&str>) -> Self {
        Self {
            max_request_size,
            server_name: server_name.and_then(|name| HeaderValue::from_str(name).ok()),
            pending: None,
        }
    }

    /// Whether a request head has been read and its body is still arriving
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn parse_head(&self, src: &mut BytesMut) -> Result<Option<PendingHead>, HttpProtocolError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_len = match req.parse(src) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => {
                if src.len() > self.max_request_size {
                    return Err(HttpProtocolError::TooLarge {
                        actual: src.len(),
                        max: self.max_request_size,
                    });
                }
                return Ok(None);
            }
            Err(e) => {
                return Err(HttpProtocolError::HttpParse(format!("Failed to parse headers: {e}")));
            }
        };

        let method = req
            .method
            .ok_or_else(|| HttpProtocolError::InvalidRequest("missing method".to_string()))?
            .to_string();
        let target = req
            .path
            .ok_or_else(|| HttpProtocolError::InvalidRequest("missing path".to_string()))?
            .to_string();
        if !target.starts_with('/') && target != "*" {
            return Err(HttpProtocolError::InvalidRequest(format!(
                "unsupported request target '{target}'"
            )));
        }
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let mut header_map = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|e| HttpProtocolError::InvalidRequest(format!("bad header name: {e}")))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|e| HttpProtocolError::InvalidRequest(format!("bad header value: {e}")))?;
            header_map.append(name, value);
        }

        if header_map.contains_key(header::TRANSFER_ENCODING) {
            return Err(HttpProtocolError::InvalidRequest(
                "Transfer-Encoding request bodies are not supported".to_string(),
            ));
        }
        let content_length = content_length(&header_map)?;
        let total = parsed_len + content_length;
        if total > self.max_request_size {
            return Err(HttpProtocolError::TooLarge {
                actual: total,
                max: self.max_request_size,
            });
        }
        let keep_alive = keep_alive(version, &header_map);

        src.advance(parsed_len);
        Ok(Some(PendingHead {
            method,
            target,
            version,
            headers: header_map,
            content_length,
            keep_alive,
        }))
    }
}

fn content_length(headers: &HeaderMap) -> Result<usize, HttpProtocolError> {
    let mut values = headers.get_all(header::CONTENT_LENGTH).iter();
    let Some(first) = values.next() else {
        return Ok(0);
    };
    if values.any(|v| v != first) {
        return Err(HttpProtocolError::InvalidRequest(
            "conflicting Content-Length headers".to_string(),
        ));
    }
    first
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| HttpProtocolError::InvalidRequest("invalid Content-Length".to_string()))
}

fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);
    match connection.as_deref() {
        Some(v) if v.contains("close") => false,
        Some(v) if v.contains("keep-alive") => true,
        _ => version == Version::HTTP_11,
    }
}

impl Decoder for HttpCodec {
    type Item = DecodedRequest;
    type Error = HttpProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let head = match self.pending.take() {
            Some(head) => head,
            None => match self.parse_head(src)? {
                Some(head) => head,
                None => return Ok(None),
            },
        };

        if src.len() < head.content_length {
            src.reserve(head.content_length - src.len());
            self.pending = Some(head);
            return Ok(None);
        }

        let body = src.split_to(head.content_length).freeze();
        Ok(Some(DecodedRequest {
            method: head.method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            body,
            keep_alive: head.keep_alive,
        }))
    }
}

impl Encoder<ResponseFrame> for HttpCodec {
    type Error = HttpProtocolError;

    fn encode(&mut self, frame: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let ResponseFrame {
            response,
            omit_body,
            close,
        } = frame;
        let status = response.status;

        dst.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                status.as_str(),
                status.canonical_reason().unwrap_or("Unknown")
            )
            .as_bytes(),
        );
        if let Some(server) = &self.server_name {
            put_header(dst, header::SERVER.as_str(), server.as_bytes());
        }
        for (name, value) in response.headers.iter() {
            if *name == header::CONTENT_LENGTH || *name == header::CONNECTION {
                continue;
            }
            put_header(dst, name.as_str(), value.as_bytes());
        }
        put_header(
            dst,
            header::CONTENT_LENGTH.as_str(),
            response.body.len().to_string().as_bytes(),
        );
        if close {
            put_header(dst, header::CONNECTION.as_str(), b"close");
        }
        dst.extend_from_slice(b"\r\n");

        if !omit_body {
            dst.extend_from_slice(&response.body);
        }
        Ok(())
    }
}

fn put_header(dst: &mut BytesMut, name: &str, value: &[u8]) {
    dst.extend_from_slice(name.as_bytes());
    dst.extend_from_slice(b": ");
    dst.extend_from_slice(value);
    dst.extend_from_slice(b"\r\n");
}
