//! Scripted single-shot HTTP server for unit tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{find_header_end, parse_content_length};

/// Serves `responses` in order, one per connection, and returns the raw
/// requests it received.
pub async fn serve(responses: Vec<Vec<u8>>) -> (u16, JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            seen.push(read_request(&mut socket).await);
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.ok();
        }
        seen
    });
    (port, handle)
}

async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return raw;
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(end) = find_header_end(&raw) {
            let headers = String::from_utf8_lossy(&raw[..end]);
            let len = parse_content_length(&headers).unwrap_or(0);
            if raw.len() >= end + 4 + len {
                return raw;
            }
        }
    }
}

/// Builds a raw HTTP/1.1 response.
pub fn http(status: &str, extra_headers: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {}\r\n{}Content-Length: {}\r\n\r\n",
        status,
        extra_headers,
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}
