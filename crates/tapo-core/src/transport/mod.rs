//! HTTP transport for Tapo devices.
//!
//! Both protocol generations talk plain HTTP/1.1 POST to port 80. The
//! [`HttpClient`] keeps the session cookie between calls and bounds every
//! exchange (connect, write and read) by one timeout.
//!
//! # Note on HTTP Implementation
//!
//! Requests are written over a raw [`TcpStream`] instead of through an HTTP
//! client library. Tapo firmware rejects requests whose header names are not
//! title-case (`Content-Type`, not `content-type`), and the common Rust HTTP
//! stacks always send lowercase names.

mod cookie;
#[cfg(test)]
pub(crate) mod test_server;

pub use cookie::SessionCookie;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::Error;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 80;

/// `Content-Type` of KLAP handshake and request bodies.
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// `Content-Type` of securePassthrough requests.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Largest response, headers included, read from a device. Plug replies
/// are a few kilobytes.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// A parsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code from the status line.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
    /// Value of the first `Set-Cookie` header, if any.
    pub set_cookie: Option<String>,
}

impl HttpResponse {
    /// Returns `true` for status 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Minimal HTTP/1.1 client bound to one device.
pub struct HttpClient {
    host: String,
    port: u16,
    timeout: Duration,
    cookie: Option<String>,
}

impl HttpClient {
    /// Creates a client for `host:port`.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            cookie: None,
        }
    }

    /// Device host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Device port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The cookie attached to every request, if set.
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// Attaches `cookie` (a `name=value` pair) to every following request.
    pub fn set_cookie(&mut self, cookie: impl Into<String>) {
        self.cookie = Some(cookie.into());
    }

    /// Stops sending a cookie.
    pub fn clear_cookie(&mut self) {
        self.cookie = None;
    }

    /// POSTs `body` to `path_and_query` and returns the response.
    ///
    /// Non-200 statuses are returned, not turned into errors; callers decide
    /// what a status means for their protocol step.
    pub async fn post(
        &self,
        path_and_query: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<HttpResponse, Error> {
        let request = self.build_request(path_and_query, body, content_type);

        debug!(
            host = %self.host,
            port = self.port,
            path = path_and_query,
            len = body.len(),
            "HTTP POST"
        );

        let response = timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "no response from {}:{} within {:?}",
                    self.host, self.port, self.timeout
                ))
            })??;

        debug!(
            status = response.status,
            len = response.body.len(),
            "HTTP response"
        );
        Ok(response)
    }

    fn build_request(&self, path_and_query: &str, body: &[u8], content_type: &str) -> Vec<u8> {
        let mut head = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Accept: */*\r\n\
             Connection: close\r\n",
            path_and_query,
            self.host,
            self.port,
            content_type,
            body.len()
        );
        if let Some(cookie) = &self.cookie {
            head.push_str(&format!("Cookie: {}\r\n", cookie));
        }
        head.push_str("\r\n");

        let mut request = head.into_bytes();
        request.extend_from_slice(body);
        request
    }

    async fn exchange(&self, request: &[u8]) -> Result<HttpResponse, Error> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{}: {}", addr, e)))?;

        stream.write_all(request).await?;

        let mut raw = Vec::with_capacity(1024);
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if raw.len() > MAX_RESPONSE_BYTES {
                return Err(Error::Protocol(format!(
                    "response from {} exceeds {} bytes",
                    addr, MAX_RESPONSE_BYTES
                )));
            }

            if let Some(header_end) = find_header_end(&raw) {
                let headers = String::from_utf8_lossy(&raw[..header_end]);
                if let Some(expected) = parse_content_length(&headers) {
                    if expected > MAX_RESPONSE_BYTES {
                        return Err(Error::Protocol(format!(
                            "response from {} declares {} bytes, limit is {}",
                            addr, expected, MAX_RESPONSE_BYTES
                        )));
                    }
                    if raw.len() - (header_end + 4) >= expected {
                        break;
                    }
                }
            }
        }

        parse_response(&raw)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("cookie", &self.cookie.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Splits a raw HTTP response into status, body and `Set-Cookie`.
fn parse_response(raw: &[u8]) -> Result<HttpResponse, Error> {
    let header_end = find_header_end(raw)
        .ok_or_else(|| Error::Protocol("invalid HTTP response: no header end".into()))?;
    let headers = String::from_utf8_lossy(&raw[..header_end]);

    let status = parse_status_code(&headers)
        .ok_or_else(|| Error::Protocol("invalid HTTP response: no status code".into()))?;

    let mut body = raw[header_end + 4..].to_vec();
    if let Some(len) = parse_content_length(&headers) {
        body.truncate(len);
    }

    Ok(HttpResponse {
        status,
        body,
        set_cookie: header_value(&headers, "set-cookie").map(str::to_string),
    })
}

/// Find the position of "\r\n\r\n" in the response (end of headers).
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse the HTTP status code from the status line.
fn parse_status_code(headers: &str) -> Option<u16> {
    headers.lines().next()?.split_whitespace().nth(1)?.parse().ok()
}

/// Parse the Content-Length header value.
fn parse_content_length(headers: &str) -> Option<usize> {
    header_value(headers, "content-length")?.parse().ok()
}

/// First value of header `name` (case-insensitive).
fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
        Content-Type: application/octet-stream\r\n\
        set-cookie: TP_SESSIONID=ABCDEF;TIMEOUT=86400\r\n\
        Content-Length: 4\r\n\
        \r\n\
        body";

    #[test]
    fn test_parse_response() {
        let response = parse_response(RESPONSE).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.is_ok());
        assert_eq!(response.body, b"body");
        assert_eq!(
            response.set_cookie.as_deref(),
            Some("TP_SESSIONID=ABCDEF;TIMEOUT=86400")
        );
    }

    #[test]
    fn test_parse_response_without_header_end() {
        assert!(matches!(
            parse_response(b"HTTP/1.1 200 OK\r\n"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_status_code() {
        assert_eq!(parse_status_code("HTTP/1.1 403 Forbidden"), Some(403));
        assert_eq!(parse_status_code("garbage"), None);
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let headers = "HTTP/1.1 200 OK\r\nCONTENT-LENGTH: 48\r\nX-Other: a:b";
        assert_eq!(parse_content_length(headers), Some(48));
        assert_eq!(header_value(headers, "x-other"), Some("a:b"));
        assert_eq!(header_value(headers, "set-cookie"), None);
    }

    #[test]
    fn test_build_request_title_case_headers() {
        let mut client = HttpClient::new("192.168.1.50", 80, Duration::from_secs(5));
        client.set_cookie("TP_SESSIONID=ABCDEF");
        let request = client.build_request("/app/request?seq=7", b"xyz", CONTENT_TYPE_BINARY);
        let text = String::from_utf8(request).unwrap();

        assert!(text.starts_with("POST /app/request?seq=7 HTTP/1.1\r\n"));
        assert!(text.contains("Host: 192.168.1.50:80\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.contains("Cookie: TP_SESSIONID=ABCDEF\r\n"));
        assert!(text.ends_with("\r\n\r\nxyz"));
    }

    #[test]
    fn test_cookie_lifecycle_and_debug() {
        let mut client = HttpClient::new("host", 80, Duration::from_secs(5));
        assert_eq!(client.cookie(), None);
        client.set_cookie("TP_SESSIONID=secret");
        assert_eq!(client.cookie(), Some("TP_SESSIONID=secret"));
        assert!(!format!("{:?}", client).contains("secret"));
        client.clear_cookie();
        assert_eq!(client.cookie(), None);
        assert!(
            !String::from_utf8(client.build_request("/app", b"", CONTENT_TYPE_JSON))
                .unwrap()
                .contains("Cookie:")
        );
    }

    #[tokio::test]
    async fn test_post_connection_refused() {
        // Bind then drop to get a port with no listener.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpClient::new("127.0.0.1", port, Duration::from_secs(5));
        let err = client.post("/app", b"{}", CONTENT_TYPE_JSON).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_post_rejects_oversized_content_length() {
        let (port, _server) = test_server::serve(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 2000000\r\n\r\nshort".to_vec(),
        ])
        .await;

        let client = HttpClient::new("127.0.0.1", port, Duration::from_secs(5));
        let err = client.post("/app", b"{}", CONTENT_TYPE_JSON).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_post_rejects_unbounded_body() {
        // No Content-Length, so the client would read until EOF.
        let mut response = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        response.resize(MAX_RESPONSE_BYTES + 4096, b'x');
        let (port, _server) = test_server::serve(vec![response]).await;

        let client = HttpClient::new("127.0.0.1", port, Duration::from_secs(5));
        let err = client.post("/app", b"{}", CONTENT_TYPE_JSON).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_post_reads_body_to_content_length() {
        let (port, server) =
            test_server::serve(vec![test_server::http("200 OK", "", b"{\"error_code\":0}")]).await;

        let client = HttpClient::new("127.0.0.1", port, Duration::from_secs(5));
        let response = client.post("/app", b"{}", CONTENT_TYPE_JSON).await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.body, br#"{"error_code":0}"#);
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_times_out() {
        // Accepts but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = HttpClient::new("127.0.0.1", port, Duration::from_millis(200));
        let err = client.post("/app", b"{}", CONTENT_TYPE_JSON).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{err:?}");
        server.abort();
    }
}
