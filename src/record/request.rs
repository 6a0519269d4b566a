use crate::Result;
use bytes::Bytes;
use http::{HeaderMap, Version};

/// Captured record of an inbound request
///
/// Records are created by the server once the request head and body have
/// been read, and are never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Zero-based arrival index across the lifetime of the server
    pub sequence: u64,
    /// Request method as sent (`GET`, `POST`, ...)
    pub method: String,
    /// Request target as sent, including any query string
    pub path: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Creates a header-less, body-less HTTP/1.1 record
    pub fn new(sequence: u64, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            sequence,
            method: method.into(),
            path: path.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The path with any query string removed
    pub fn path_only(&self) -> &str {
        self.path
            .split_once('?')
            .map_or(self.path.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, query)| query)
    }

    /// First value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_utf8(&self) -> Result<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }
}
