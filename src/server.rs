//! HTTP/1.1 listener serving responses from a [`ResponseGenerator`].
//!
//! One tokio task per connection. The listener decodes the request line,
//! headers, and `Content-Length`-delimited body, hands the request to the
//! generator, and writes the resolved response back with the transport
//! headers (`Server`, `Date`, `Content-Length`) it owns.

use crate::reqresp::{reason_phrase, Body, Headers, Method, Request, Response};
use crate::respgen::ResponseGenerator;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

const HTTP_VERSION: &str = "HTTP/1.1";
const DEFAULT_SERVER_HEADER: &str = concat!("mockd/", env!("CARGO_PKG_VERSION"));

pub struct MockServer {
    listener: TcpListener,
    generator: Arc<dyn ResponseGenerator>,
    server_header: String,
}

impl MockServer {
    /// Bind the listener. The `Server` header comes from the generator's
    /// spec when declared, else a fixed default identifier.
    pub async fn bind(addr: &str, generator: Arc<dyn ResponseGenerator>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let server_header = generator
            .server_header()
            .unwrap_or(DEFAULT_SERVER_HEADER)
            .to_string();
        Ok(Self {
            listener,
            generator,
            server_header,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!(%peer, "accepted connection");
            let generator = Arc::clone(&self.generator);
            let server_header = self.server_header.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(socket, generator, server_header).await {
                    error!(%peer, error = %e, "connection error");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    generator: Arc<dyn ResponseGenerator>,
    server_header: String,
) -> io::Result<()> {
    let mut buffer = Vec::with_capacity(4096);
    loop {
        let request = match read_request(&mut stream, &mut buffer).await? {
            Some(Ok(request)) => request,
            Some(Err(e)) => {
                // Protocol errors get a direct transport response; the
                // generator never sees the request.
                let status = match e {
                    ParseError::UnknownMethod => 501,
                    _ => 400,
                };
                let response = Response::new(status, Headers::new(), Bytes::new());
                write_response(&mut stream, &response, &server_header).await?;
                return Ok(());
            }
            None => return Ok(()),
        };

        let keep_alive = request
            .headers
            .get("Connection")
            .map(|v| v.eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(true);

        let response = generator.respond(&request).await;
        write_response(&mut stream, &response, &server_header).await?;

        if !keep_alive {
            return Ok(());
        }
    }
}

async fn read_request(
    stream: &mut TcpStream,
    buffer: &mut Vec<u8>,
) -> io::Result<Option<Result<Request, ParseError>>> {
    loop {
        match parse_request(buffer) {
            Ok((request, consumed)) => {
                buffer.drain(..consumed);
                return Ok(Some(Ok(request)));
            }
            Err(ParseError::Incomplete) => {}
            Err(e) => return Ok(Some(Err(e))),
        }

        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            // Client closed; a half-received request is simply dropped.
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseError {
    Incomplete,
    InvalidRequest,
    UnknownMethod,
    InvalidHeader,
    InvalidContentLength,
}

/// Parse one buffered HTTP/1.1 request. Returns the request and the number
/// of bytes it consumed, or `Incomplete` when more input is needed.
pub fn parse_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;
    let body_bytes = &buf[headers_end + 4..];

    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();
    let method_token = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::parse(method_token).ok_or(ParseError::UnknownMethod)?;

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    let content_length = headers
        .get("Content-Length")
        .map(|v| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()?
        .unwrap_or(0);

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = Body::new(body_bytes[..content_length].to_vec());
    let consumed = headers_end + 4 + content_length;
    Ok((Request::new(path, method, headers, body), consumed))
}

async fn write_response(
    stream: &mut TcpStream,
    response: &Response,
    server_header: &str,
) -> io::Result<()> {
    let mut out = Vec::with_capacity(256 + response.body.len());
    out.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            HTTP_VERSION,
            response.status,
            reason_phrase(response.status)
        )
        .as_bytes(),
    );

    write_header(&mut out, "Server", server_header);
    write_header(&mut out, "Date", &http_date());
    for (name, value) in &response.headers {
        write_header(&mut out, name, value);
    }
    write_header(&mut out, "Content-Length", &response.body.len().to_string());

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&response.body);

    stream.write_all(&out).await?;
    stream.flush().await
}

fn write_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let raw = b"GET /users/1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (request, consumed) = parse_request(raw).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/users/1");
        assert_eq!(
            request.headers.get("Host").map(String::as_str),
            Some("example.com")
        );
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn test_parse_post_with_body() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloEXTRA";
        let (request, consumed) = parse_request(raw).unwrap();
        assert_eq!(&request.body.bytes()[..], b"hello");
        assert_eq!(consumed, raw.len() - 5);
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(
            parse_request(b"GET / HTTP/1.1\r\n").unwrap_err(),
            ParseError::Incomplete
        );
        assert_eq!(
            parse_request(b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel").unwrap_err(),
            ParseError::Incomplete
        );
    }

    #[test]
    fn test_parse_unknown_method() {
        assert_eq!(
            parse_request(b"BREW /pot HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::UnknownMethod
        );
    }

    #[test]
    fn test_parse_bad_header() {
        assert_eq!(
            parse_request(b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n").unwrap_err(),
            ParseError::InvalidHeader
        );
    }

    #[test]
    fn test_header_order_preserved() {
        let raw = b"GET / HTTP/1.1\r\nB: 2\r\nA: 1\r\n\r\n";
        let (request, _) = parse_request(raw).unwrap();
        let names: Vec<_> = request.headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
