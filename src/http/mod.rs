//! HTTP/1.1 wire handling for the mock server
//!
//! This module holds the server configuration, the request/response codec
//! used on every connection, and a small client for exercising a running
//! server from tests.

pub mod client;
pub mod config;
pub mod protocol;


pub use client::{ClientResponse, HttpClient};
pub use config::MockConfig;
pub use protocol::{DecodedRequest, HttpCodec, HttpProtocolError, ResponseFrame};
