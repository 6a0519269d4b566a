use color_eyre::eyre::{Result, WrapErr, bail};
use mocksrv::{CannedResponse, MockConfig, MockServer, RouteRule};
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage(program: &str) {
    eprintln!("Usage: {program} [--port PORT] [--base BASE_PATH] [ROUTE...]");
    eprintln!("  ROUTE: PATH=STATUS[:BODY], matched exactly against the request path");
    eprintln!("  With no routes, serves {{BASE}}/hello-world -> 200 \"Hello, World!\"");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {program} --base /api/v1                          # Reference hello-world route");
    eprintln!("  {program} --port 8080 /health=200:ok /gone=410    # Two explicit routes");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mocksrv=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("mocksrv");

    let mut port = 0u16;
    let mut base_path = "/api/v1".to_string();
    let mut routes = Vec::new();

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--port" => {
                let value = rest.next().map(String::as_str).unwrap_or_default();
                port = value
                    .parse()
                    .wrap_err_with(|| format!("Invalid port '{value}'"))?;
            }
            "--base" => {
                base_path = rest.next().cloned().unwrap_or_default();
            }
            "-h" | "--help" => {
                usage(program);
                return Ok(());
            }
            route if route.starts_with('/') => {
                routes.push(route.parse::<RouteRule>()?);
            }
            other => {
                usage(program);
                bail!("Unexpected argument '{other}'");
            }
        }
    }

    if routes.is_empty() {
        routes.push(RouteRule::new(
            format!("{base_path}/hello-world"),
            CannedResponse::ok("Hello, World!"),
        ));
    }

    let config = MockConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
        base_path,
        ..MockConfig::default()
    };
    let mut server = MockServer::new(config);
    for rule in &routes {
        info!(route = %rule, "Registering route");
    }
    server.set_routes(routes);

    let base_url = server.start().await.wrap_err("Failed to start mock server")?;
    info!(%base_url, "Serving until Ctrl-C");

    signal::ctrl_c().await.wrap_err("Failed to listen for Ctrl-C")?;
    info!("Received shutdown signal, stopping server");

    server.stop().await.wrap_err("Failed to stop mock server")?;
    while let Some(request) = server.try_take_request() {
        info!(sequence = request.sequence, method = %request.method, path = %request.path, "Recorded");
    }
    Ok(())
}
