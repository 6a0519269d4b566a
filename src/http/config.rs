use crate::{MockError, Result};
use std::time::Duration;

/// Configuration for the mock HTTP server
///
/// # Examples
///
/// ```rust
/// use mocksrv::http::MockConfig;
/// use std::time::Duration;
///
/// let config = MockConfig {
///     base_path: "/api/v1".to_string(),
///     take_timeout: Duration::from_secs(2),
///     ..MockConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.bind_addr.port(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Network address to bind to; port 0 lets the OS pick one
    pub bind_addr: std::net::SocketAddr,
    /// Prefix prepended to every URL built by the server
    pub base_path: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Initial read buffer size per connection
    pub buffer_size: usize,
    /// Largest accepted request, head and body together
    pub max_request_size: usize,
    /// Idle time after which a connection is closed
    pub read_timeout: Duration,
    /// Write timeout for responses
    pub write_timeout: Duration,
    /// Default wait for `MockServer::take_request_default`
    pub take_timeout: Duration,
    /// Server name to include in responses (optional)
    pub server_name: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::net::SocketAddr::from(([127, 0, 0, 1], 0)),
            base_path: String::new(),
            max_connections: 100,
            buffer_size: 8192,
            max_request_size: 1024 * 1024, // 1MB
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            take_timeout: Duration::from_secs(10),
            server_name: Some(format!("mocksrv/{}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl MockConfig {
    /// Checks the settings that would otherwise fail later at request time
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.is_empty() {
            if !self.base_path.starts_with('/') {
                return Err(MockError::Config(format!(
                    "Base path '{}' must start with '/'",
                    self.base_path
                )));
            }
            if self.base_path.ends_with('/') {
                return Err(MockError::Config(format!(
                    "Base path '{}' must not end with '/'",
                    self.base_path
                )));
            }
        }
        if self.max_connections == 0 {
            return Err(MockError::Config("max_connections must be at least 1".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(MockError::Config("buffer_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
