//! 端到端测试：在进程内启动监听器，通过真实的 TCP 连接收发报文。

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use tiger::{
    param::server_header, server, Pipeline, ScriptTable, ServerConfig, TemplateEngine, Tunables,
};

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for d in ["public", "cache", "scripts"] {
        fs::create_dir(dir.path().join(d)).unwrap();
    }
    dir
}

async fn start(config: ServerConfig) -> SocketAddr {
    let scripts = ScriptTable::load_dir(&config.scripts_dir(), &TemplateEngine).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let pipeline = Arc::new(Pipeline::new(Arc::new(config), Arc::new(scripts)));
    tokio::spawn(server::serve(listener, pipeline));
    addr
}

async fn start_in(root: &Path) -> SocketAddr {
    start(ServerConfig::new(0, root.to_path_buf())).await
}

/// 发送一次请求并读到连接关闭为止
async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("服务端没有关闭连接")
        .unwrap();
    response
}

async fn exchange_text(addr: SocketAddr, request: &str) -> String {
    String::from_utf8(exchange(addr, request.as_bytes()).await).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_file_is_404() {
    let dir = site();
    let addr = start_in(dir.path()).await;
    let response = exchange_text(addr, "GET /missing.html HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 404 Not Found\r\n"));
    assert!(response.contains("<h1>Error 404</h1>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_static_file_exact_bytes() {
    let dir = site();
    fs::write(dir.path().join("public/hello.txt"), b"hello, tiger").unwrap();
    let addr = start_in(dir.path()).await;
    let response = exchange(addr, b"GET /hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    let expected = format!(
        "HTTP/1.0 200 OK\r\nServer: {}\r\n\r\nhello, tiger",
        server_header()
    );
    assert_eq!(response, expected.into_bytes());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_file_is_served_verbatim() {
    let dir = site();
    let body: Vec<u8> = (0..=255u8).cycle().take(4000).collect();
    fs::write(dir.path().join("public/blob.bin"), &body).unwrap();
    let addr = start_in(dir.path()).await;
    let response = exchange(addr, b"GET /blob.bin HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with(b"HTTP/1.0 200 OK\r\n"));
    assert!(response.ends_with(&body));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_redirect() {
    let dir = site();
    fs::write(dir.path().join("public/index.html"), b"<h1>home</h1>").unwrap();
    let addr = start_in(dir.path()).await;
    let response = exchange_text(addr, "GET / HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(response.ends_with("<h1>home</h1>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_head_and_options() {
    let dir = site();
    fs::write(dir.path().join("public/a.txt"), b"body").unwrap();
    let addr = start_in(dir.path()).await;

    let head = exchange_text(addr, "HEAD /a.txt HTTP/1.0\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(head.ends_with("\r\n\r\n"));

    let options = exchange_text(addr, "OPTIONS /a.txt HTTP/1.1\r\n\r\n").await;
    assert!(options.contains("Allow: OPTIONS, GET, HEAD\r\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_script_route() {
    let dir = site();
    fs::write(
        dir.path().join("scripts/api.bns"),
        "@route /api/*\n@status 200\n\n{\"verb\":\"{{verb}}\",\"path\":\"{{truepath}}\",\"query\":\"{{query}}\"}",
    )
    .unwrap();
    let addr = start_in(dir.path()).await;
    let response = exchange_text(addr, "DELETE /api/users/7?force=1 HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 200 OK\r\nServer: "));
    assert!(response.ends_with("{\"verb\":\"DELETE\",\"path\":\"/api/users/7\",\"query\":\"force=1\"}"));

    let response = exchange_text(addr, "GET /other HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 404 "));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_protocol_errors() {
    let dir = site();
    let addr = start_in(dir.path()).await;
    let cases = [
        ("GET /\r\n\r\n", "HTTP/1.0 400 "),
        ("BREW /pot HTTP/1.1\r\n\r\n", "HTTP/1.0 501 "),
        ("GET / HTTP/2\r\n\r\n", "HTTP/1.0 505 "),
    ];
    for (request, expected) in cases {
        let response = exchange_text(addr, request).await;
        assert!(response.starts_with(expected), "{:?} -> {:?}", request, response);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_error_page() {
    let dir = site();
    fs::write(dir.path().join("public/404.html"), b"<p>lost</p>").unwrap();
    let addr = start_in(dir.path()).await;
    let response = exchange_text(addr, "GET /nothing HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 404 Not Found\r\n"));
    assert!(response.ends_with("\r\n\r\n<p>lost</p>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_clients() {
    let dir = site();
    fs::write(dir.path().join("public/shared.txt"), b"same bytes for everyone").unwrap();
    let addr = start_in(dir.path()).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        handles.push(tokio::spawn(async move {
            exchange(addr, b"GET /shared.txt HTTP/1.0\r\n\r\n").await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert!(response.ends_with(b"\r\n\r\nsame bytes for everyone"));
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_php_bridge_end_to_end() {
    let dir = site();
    fs::write(dir.path().join("public/echo.php"), "printf '%s' \"$1\"").unwrap();
    let tunables = Tunables::from_toml_str("php_binary = \"sh\"\nphp_timeout = 5");
    let addr = start(ServerConfig::new(0, dir.path().to_path_buf()).with_tunables(tunables)).await;
    let response = exchange_text(addr, "GET /echo.php?x=1&y=2 HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(response.ends_with("\r\n\r\nx=1 y=2"));
}
