//! Transfers over a real listener, with plain HTTP/1.1 clients on raw sockets.
//!
//! Unlike router-level tests these let the server decide when to stop
//! reading a response body, which it does as soon as `Content-Length` bytes
//! are out.

use passthru_relay::http::build_router;
use passthru_relay::{Config, PassthruRelay};
use passthru_types::{SessionKey, StatusReply, TransferOutcome};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const BOUNDARY: &str = "servedBoundary42";

struct Served {
    relay: Arc<PassthruRelay>,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl Drop for Served {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve() -> Served {
    let relay = Arc::new(
        PassthruRelay::new(Config::default()).with_wait_timeout(Duration::from_secs(30)),
    );
    let app = build_router(relay.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    Served {
        relay,
        addr,
        server,
    }
}

struct RawResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RawResponse {
    fn parse(raw: &[u8]) -> Self {
        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has no header terminator");
        let head = String::from_utf8_lossy(&raw[..split]).to_string();
        let rest = &raw[split + 4..];

        let mut lines = head.split("\r\n");
        let status = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .expect("malformed status line");
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        let chunked = headers
            .iter()
            .any(|(name, value)| name == "transfer-encoding" && value.contains("chunked"));
        let body = if chunked {
            decode_chunked(rest)
        } else {
            rest.to_vec()
        };

        Self {
            status,
            headers,
            body,
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn outcome(&self) -> TransferOutcome {
        let reply: StatusReply = serde_json::from_slice(&self.body).expect("not a status reply");
        reply.result
    }
}

fn decode_chunked(mut raw: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let line_end = raw
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("truncated chunk header");
        let size_text = String::from_utf8_lossy(&raw[..line_end]);
        let size_text = size_text.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16).expect("bad chunk size");
        raw = &raw[line_end + 2..];
        if size == 0 {
            return body;
        }
        body.extend_from_slice(&raw[..size]);
        raw = &raw[size + 2..];
    }
}

async fn exchange(addr: SocketAddr, request: Vec<u8>) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    RawResponse::parse(&raw)
}

fn upload_request(key: &str, size: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"size\"\r\n\r\n{size}\r\n\
         --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"h.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut request = format!(
        "POST /upload/{key} HTTP/1.1\r\n\
         Host: localhost\r\n\
         Content-Type: multipart/form-data; boundary={BOUNDARY}\r\n\
         X-Requested-With: XMLHttpRequest\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    request
}

fn download_request(key: &str) -> Vec<u8> {
    format!("GET /download/{key} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .into_bytes()
}

async fn wait_for_registration(relay: &PassthruRelay, key: &str) {
    let key = SessionKey::new(key).unwrap();
    for _ in 0..400 {
        if relay.registry().contains(&key) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("upload for {} never registered", key);
}

/// Run one upload and one download for `key`; returns (uploader, downloader).
async fn transfer(
    served: &Served,
    key: &str,
    size: &str,
    data: &[u8],
) -> (RawResponse, RawResponse) {
    let upload = tokio::spawn(exchange(served.addr, upload_request(key, size, data)));
    wait_for_registration(&served.relay, key).await;

    let download = exchange(served.addr, download_request(key)).await;
    let upload = upload.await.unwrap();
    (upload, download)
}

#[tokio::test]
async fn test_declared_size_transfer_reports_ok() {
    let served = serve().await;

    let (upload, download) = transfer(&served, "abc", "5", b"hello").await;

    assert_eq!(download.status, 200);
    assert_eq!(download.header("content-length"), Some("5"));
    assert_eq!(download.header("content-type"), Some("text/plain"));
    assert_eq!(
        download.header("content-disposition"),
        Some("attachment; filename=\"h.txt\"")
    );
    assert_eq!(download.body, b"hello");

    assert_eq!(upload.status, 200);
    assert_eq!(upload.outcome(), TransferOutcome::Ok);
    assert_eq!(served.relay.active_sessions(), 0);
}

#[tokio::test]
async fn test_chunked_transfer_reports_ok() {
    let served = serve().await;

    let (upload, download) = transfer(&served, "chunky", "-1", b"hello").await;

    assert_eq!(download.status, 200);
    assert_eq!(download.header("content-length"), None);
    assert_eq!(download.header("transfer-encoding"), Some("chunked"));
    assert_eq!(download.body, b"hello");

    assert_eq!(upload.status, 200);
    assert_eq!(upload.outcome(), TransferOutcome::Ok);
}

#[tokio::test]
async fn test_empty_declared_file_reports_ok() {
    let served = serve().await;

    let (upload, download) = transfer(&served, "empty", "0", b"").await;

    assert_eq!(download.status, 200);
    assert_eq!(download.header("content-length"), Some("0"));
    assert!(download.body.is_empty());

    assert_eq!(upload.status, 200);
    assert_eq!(upload.outcome(), TransferOutcome::Ok);
}

#[tokio::test]
async fn test_unknown_key_over_the_wire() {
    let served = serve().await;

    let download = exchange(served.addr, download_request("nope")).await;
    assert_eq!(download.status, 404);
    assert_eq!(download.body, b"session not found");
    assert_eq!(served.relay.active_sessions(), 0);
}
