use color_eyre::eyre::{Result, WrapErr, eyre};
use http::StatusCode;
use mocksrv::common::start_server_with_routes;
use mocksrv::{CannedResponse, HttpClient, MockError, MockServer, RouteRule};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const BASE_PATH: &str = "/api/v1";
const RESPONSE_PAYLOAD: &str = "Hello, World!";

/// Server scripted with the hello-world route under `/api/v1`
async fn hello_world_server() -> Result<MockServer> {
    let server = start_server_with_routes(
        BASE_PATH,
        [RouteRule::new(
            "/api/v1/hello-world",
            CannedResponse::ok(RESPONSE_PAYLOAD),
        )],
    )
    .await
    .wrap_err("Failed to start mock server")?;
    Ok(server)
}

/// Reads one complete `Content-Length` framed response from a kept-alive stream
async fn read_one_response(stream: &mut TcpStream) -> Result<mocksrv::http::ClientResponse> {
    let mut raw = Vec::new();
    let mut buffer = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buffer)).await??;
        if n == 0 {
            return Err(eyre!("connection closed before a full response"));
        }
        raw.extend_from_slice(&buffer[..n]);
        if let Some(head_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = mocksrv::http::client::parse_response(&raw, true)?;
            let expected = head
                .headers
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + expected {
                return Ok(mocksrv::http::client::parse_response(&raw, false)?);
            }
        }
    }
}

#[tokio::test]
async fn test_valid_endpoint_returns_200_response() -> Result<()> {
    let mut server = hello_world_server().await?;

    let response = HttpClient::new().get(&server.url("/hello-world")?).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text()?, RESPONSE_PAYLOAD);

    let recorded = server.take_request(Duration::from_secs(5)).await?;
    assert_eq!(recorded.method, "GET");
    assert_eq!(recorded.path, format!("{BASE_PATH}/hello-world"));

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_endpoint_returns_404_response() -> Result<()> {
    let mut server = hello_world_server().await?;

    let response = HttpClient::new().get(&server.url("/invalid")?).await?;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.text()?.is_empty());

    // Misses are recorded too
    let recorded = server.take_request(Duration::from_secs(5)).await?;
    assert_eq!(recorded.path, "/api/v1/invalid");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_requests_recorded_in_send_order() -> Result<()> {
    let server = hello_world_server().await?;
    let client = HttpClient::new();

    for suffix in ["/a", "/b", "/hello-world", "/c"] {
        client.get(&server.url(suffix)?).await?;
    }

    let mut paths = Vec::new();
    for expected_sequence in 0..4 {
        let recorded = server.take_request(Duration::from_secs(5)).await?;
        assert_eq!(recorded.sequence, expected_sequence);
        paths.push(recorded.path);
    }
    assert_eq!(
        paths,
        vec!["/api/v1/a", "/api/v1/b", "/api/v1/hello-world", "/api/v1/c"]
    );
    assert_eq!(server.request_count(), 4);
    assert!(server.try_take_request().is_none());
    Ok(())
}

#[tokio::test]
async fn test_take_request_times_out_without_traffic() -> Result<()> {
    let server = hello_world_server().await?;

    let wait = Duration::from_millis(100);
    let started = std::time::Instant::now();
    let result = server.take_request(wait).await;

    assert!(matches!(result, Err(MockError::TakeTimeout(_))));
    assert!(started.elapsed() >= wait);
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn test_stop_refuses_connections_and_releases_takers() -> Result<()> {
    let mut server = hello_world_server().await?;
    let addr = server.addr().ok_or_else(|| eyre!("server has no address"))?;

    server.stop().await?;

    assert!(TcpStream::connect(addr).await.is_err());
    let result = server.take_request(Duration::from_secs(5)).await;
    assert!(matches!(result, Err(MockError::Stopped)));
    Ok(())
}

#[tokio::test]
async fn test_stop_aborts_idle_keep_alive_connection() -> Result<()> {
    let mut server = hello_world_server().await?;
    let addr = server.addr().ok_or_else(|| eyre!("server has no address"))?;

    // A connection that never sends anything would otherwise sit until the read timeout
    let mut idle = TcpStream::connect(addr).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .wrap_err("stop hung on an idle connection")??;

    let mut buffer = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), idle.read(&mut buffer)).await?;
    assert!(matches!(read, Ok(0) | Err(_)));
    Ok(())
}

#[tokio::test]
async fn test_malformed_request_gets_400_and_server_keeps_serving() -> Result<()> {
    let server = hello_world_server().await?;
    let addr = server.addr().ok_or_else(|| eyre!("server has no address"))?;
    let client = HttpClient::new();

    let raw = client.send_raw(addr, b"THIS IS NOT HTTP\r\n\r\n").await?;
    let response = mocksrv::http::client::parse_response(&raw, false)?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body.is_empty());

    let response = client.get(&server.url("/hello-world")?).await?;
    assert_eq!(response.status, StatusCode::OK);

    // Only the well-formed request was recorded
    assert_eq!(server.request_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_request_cut_short_by_client_gets_400() -> Result<()> {
    let server = hello_world_server().await?;
    let addr = server.addr().ok_or_else(|| eyre!("server has no address"))?;
    let mut stream = TcpStream::connect(addr).await?;

    // Announces ten body bytes, sends three, then half-closes
    stream
        .write_all(b"POST /api/v1/hello-world HTTP/1.1\r\nHost: test\r\nContent-Length: 10\r\n\r\nabc")
        .await?;
    stream.shutdown().await?;

    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw)).await??;
    let response = mocksrv::http::client::parse_response(&raw, false)?;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.headers.get(http::header::CONNECTION).map(|v| v.as_bytes()), Some(&b"close"[..]));
    assert_eq!(server.request_count(), 0);

    // Same for a head that never completes
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"GET /api/v1/hello-world HTTP/1.1\r\nHost: te").await?;
    stream.shutdown().await?;
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw)).await??;
    let response = mocksrv::http::client::parse_response(&raw, false)?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(server.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_oversized_request_gets_413() -> Result<()> {
    let mut server = MockServer::new(mocksrv::MockConfig {
        max_request_size: 256,
        ..Default::default()
    });
    server.start().await?;
    let addr = server.addr().ok_or_else(|| eyre!("server has no address"))?;

    let request = "POST /upload HTTP/1.1\r\nContent-Length: 100000\r\n\r\n";
    let raw = HttpClient::new().send_raw(addr, request.as_bytes()).await?;
    let response = mocksrv::http::client::parse_response(&raw, false)?;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(server.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_keep_alive_serves_sequential_requests() -> Result<()> {
    let server = hello_world_server().await?;
    let addr = server.addr().ok_or_else(|| eyre!("server has no address"))?;
    let mut stream = TcpStream::connect(addr).await?;

    stream
        .write_all(b"GET /api/v1/hello-world HTTP/1.1\r\nHost: test\r\n\r\n")
        .await?;
    let first = read_one_response(&mut stream).await?;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.text()?, RESPONSE_PAYLOAD);

    stream
        .write_all(b"GET /api/v1/nope HTTP/1.1\r\nHost: test\r\n\r\n")
        .await?;
    let second = read_one_response(&mut stream).await?;
    assert_eq!(second.status, StatusCode::NOT_FOUND);

    let a = server.take_request(Duration::from_secs(5)).await?;
    let b = server.take_request(Duration::from_secs(5)).await?;
    assert_eq!((a.path.as_str(), b.path.as_str()), ("/api/v1/hello-world", "/api/v1/nope"));
    Ok(())
}

#[tokio::test]
async fn test_post_body_and_headers_are_recorded() -> Result<()> {
    let server = start_server_with_routes(
        "",
        [RouteRule::new(
            "/submit",
            CannedResponse::new(StatusCode::CREATED).with_body("created"),
        )],
    )
    .await?;

    let response = HttpClient::new()
        .request("POST", &server.url("/submit")?, b"{\"name\":\"mock\"}")
        .await?;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.text()?, "created");

    let recorded = server.take_request(Duration::from_secs(5)).await?;
    assert_eq!(recorded.method, "POST");
    assert_eq!(recorded.body_utf8()?, "{\"name\":\"mock\"}");
    assert_eq!(recorded.header("content-length"), Some("15"));
    assert_eq!(recorded.header("connection"), Some("close"));
    Ok(())
}

#[tokio::test]
async fn test_head_request_has_no_body() -> Result<()> {
    let server = hello_world_server().await?;

    let response = HttpClient::new()
        .request("HEAD", &server.url("/hello-world")?, &[])
        .await?;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert_eq!(
        response.headers.get(http::header::CONTENT_LENGTH).map(|v| v.as_bytes()),
        Some(&b"13"[..])
    );
    Ok(())
}

#[tokio::test]
async fn test_concurrent_clients_all_recorded_once() -> Result<()> {
    let server = hello_world_server().await?;
    let url = server.url("/hello-world")?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let url = url.clone();
        handles.push(tokio::spawn(async move { HttpClient::new().get(&url).await }));
    }
    for handle in handles {
        let response = handle.await??;
        assert_eq!(response.status, StatusCode::OK);
    }

    let mut sequences = Vec::new();
    for _ in 0..8 {
        sequences.push(server.take_request(Duration::from_secs(5)).await?.sequence);
    }
    assert_eq!(sequences, (0..8).collect::<Vec<_>>());
    assert!(server.try_take_request().is_none());
    Ok(())
}
