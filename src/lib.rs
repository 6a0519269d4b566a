use crate::http::protocol::HttpProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Error types for the mocksrv library
#[derive(Error, Debug)]
pub enum MockError {
    /// The listener could not be bound
    #[error("Bind error: {0}")]
    Bind(std::io::Error),

    /// Socket errors after the listener is up (connect, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called on a running server
    #[error("Server already started")]
    AlreadyStarted,

    /// `start` or `stop` was called on a server that has been stopped
    #[error("Server already stopped")]
    AlreadyStopped,

    /// An operation that needs a bound port was called before `start`
    #[error("Server not started")]
    NotStarted,

    /// The server stopped and no recorded requests remain
    #[error("Server stopped with no recorded requests left")]
    Stopped,

    /// No request arrived within the wait
    #[error("No request recorded within {0:?}")]
    TakeTimeout(Duration),

    /// A URL could not be assembled from the bound address and path
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ::http::Error),

    /// A client URL without a usable `host:port` authority
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wire-level HTTP errors
    #[error("HTTP protocol error: {0}")]
    Protocol(HttpProtocolError),

    /// Timeout errors on client operations
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// UTF-8 encoding errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<HttpProtocolError> for MockError {
    fn from(err: HttpProtocolError) -> Self {
        match err {
            HttpProtocolError::Io(e) => MockError::Io(e),
            other => MockError::Protocol(other),
        }
    }
}

/// Result type for the mocksrv library
pub type Result<T> = std::result::Result<T, MockError>;

pub mod common;
pub mod dispatch;
pub mod http;
pub mod record;
pub mod server;

// Re-export main types for convenience
pub use common::Dispatcher;
pub use dispatch::{CannedResponse, RouteRule, RouteTable};
pub use crate::http::{HttpClient, HttpCodec, MockConfig};
pub use record::{RecordedRequest, RequestJournal};
pub use server::MockServer;
