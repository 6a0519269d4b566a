use super::protocol::HttpProtocolError;
use crate::{MockError, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Status, headers and body of a response read by [`HttpClient`]
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ClientResponse {
    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }
}

/// Minimal HTTP/1.1 client for driving a mock server in tests
///
/// Each request opens its own connection and asks the server to close it,
/// so the response is read to end of stream.
///
/// # Examples
///
/// ```no_run
/// use mocksrv::HttpClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let uri = "http://127.0.0.1:8080/api/v1/hello-world".parse()?;
///     let response = HttpClient::new().get(&uri).await?;
///     println!("{} {}", response.status, response.text()?);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }

    /// Sets the limit for connecting and for each read or write
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn get(&self, uri: &Uri) -> Result<ClientResponse> {
        self.request("GET", uri, &[]).await
    }

    /// Sends `method` to `uri` with an optional body
    pub async fn request(&self, method: &str, uri: &Uri, body: &[u8]) -> Result<ClientResponse> {
        let authority = uri
            .authority()
            .ok_or_else(|| MockError::UnsupportedUrl(format!("'{uri}' has no host")))?;
        let addr: SocketAddr = authority
            .as_str()
            .parse()
            .map_err(|e| MockError::UnsupportedUrl(format!("'{uri}' is not host:port: {e}")))?;
        let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

        let mut request = format!(
            "{method} {target} HTTP/1.1\r\nHost: {authority}\r\nConnection: close\r\n"
        );
        if !body.is_empty() || method == "POST" || method == "PUT" {
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        request.push_str("\r\n");
        let mut raw = request.into_bytes();
        raw.extend_from_slice(body);

        let reply = self.send_raw(addr, &raw).await?;
        parse_response(&reply, method == "HEAD")
    }

    /// Writes `data` as-is and returns everything the server sends back
    /// before closing the connection
    pub async fn send_raw(&self, addr: SocketAddr, data: &[u8]) -> Result<Vec<u8>> {
        let mut stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| MockError::Timeout(format!("Connection to {addr} timed out")))??;

        timeout(self.timeout, stream.write_all(data))
            .await
            .map_err(|_| MockError::Timeout("Write timeout".to_string()))??;

        let mut reply = Vec::new();
        let mut buffer = [0u8; 4096];
        loop {
            let n = timeout(self.timeout, stream.read(&mut buffer))
                .await
                .map_err(|_| MockError::Timeout("Read timeout".to_string()))??;
            if n == 0 {
                break;
            }
            reply.extend_from_slice(&buffer[..n]);
        }
        Ok(reply)
    }
}

/// Parses a complete HTTP/1.x response
pub fn parse_response(raw: &[u8], head_only: bool) -> Result<ClientResponse> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut headers);

    let parsed_len = match response.parse(raw) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => {
            return Err(HttpProtocolError::IncompleteResponse("head cut short".to_string()).into());
        }
        Err(e) => {
            return Err(HttpProtocolError::HttpParse(format!(
                "Failed to parse response: {e}"
            ))
            .into());
        }
    };

    let status = response
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| HttpProtocolError::HttpParse("response has no valid status".to_string()))?;

    let mut header_map = HeaderMap::new();
    for h in response.headers.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(h.name.as_bytes()),
            HeaderValue::from_bytes(h.value),
        ) {
            header_map.append(name, value);
        }
    }

    let rest = &raw[parsed_len..];
    let body = if head_only {
        Bytes::new()
    } else {
        let length = header_map
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(rest.len());
        if rest.len() < length {
            return Err(HttpProtocolError::IncompleteResponse(format!(
                "body has {} of {length} bytes",
                rest.len()
            ))
            .into());
        }
        Bytes::copy_from_slice(&rest[..length])
    };

    Ok(ClientResponse {
        status,
        headers: header_map,
        body,
    })
}
