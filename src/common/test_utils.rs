use crate::dispatch::RouteRule;
use crate::http::MockConfig;
use crate::server::MockServer;
use crate::Result;

/// Starts a mock server on an ephemeral loopback port with the given routes
///
/// Used by integration tests and benches that need a running server but do
/// not care about the rest of the configuration.
pub async fn start_server_with_routes(
    base_path: &str,
    routes: impl IntoIterator<Item = RouteRule>,
) -> Result<MockServer> {
    let config = MockConfig {
        base_path: base_path.to_string(),
        ..MockConfig::default()
    };

    let mut server = MockServer::new(config);
    server.set_routes(routes);
    server.start().await?;
    Ok(server)
}
