//! End-to-end tests driving the listener over a loopback socket.

use mockd::{MockServer, PatternResponseGenerator};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const SPEC: &str = r#"
{
    "global": {
        "headers": {"X-Powered-By": "mockd"},
        "serverHeader": "todo-backend/1.0"
    },
    "rules": {
        "^/users/(\\w+)/todo/(\\d+)$": {
            "GET": {
                "status": 200,
                "content": {"user": "{0}", "taskid": "{1}"},
                "contentType": "json",
                "interpolate": true
            },
            "DELETE": {"status": 410}
        },
        "^/health$": {
            "GET": {"content": "ok"}
        }
    }
}
"#;

async fn start_server() -> std::net::SocketAddr {
    let generator = Arc::new(PatternResponseGenerator::from_json(SPEC).unwrap());
    let server = MockServer::bind("127.0.0.1:0", generator).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

async fn roundtrip(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_interpolated_json_response() {
    let addr = start_server().await;
    let response = roundtrip(
        addr,
        "GET /users/tomlee/todo/123 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Server: todo-backend/1.0\r\n"));
    assert!(response.contains("X-Powered-By: mockd\r\n"));
    assert!(response.contains("Content-Type: application/json\r\n"));
    assert!(response.ends_with(r#"{"user": "tomlee", "taskid": "123"}"#));
}

#[tokio::test]
async fn test_status_only_response() {
    let addr = start_server().await;
    let response = roundtrip(
        addr,
        "DELETE /users/tomlee/todo/123 HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 410 Gone\r\n"), "{response}");
    assert!(response.contains("Content-Length: 0\r\n"));
}

#[tokio::test]
async fn test_unmatched_path_is_404() {
    let addr = start_server().await;
    let response = roundtrip(addr, "GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
}

#[tokio::test]
async fn test_unknown_method_is_501() {
    let addr = start_server().await;
    let response = roundtrip(addr, "BREW /health HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(
        response.starts_with("HTTP/1.1 501 Not Implemented\r\n"),
        "{response}"
    );
}

#[tokio::test]
async fn test_keep_alive_serves_multiple_requests() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    for _ in 0..2 {
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        let response = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("ok"), "{response}");
    }
}
