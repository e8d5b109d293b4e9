//! Shared fixtures for integration tests: hand-rolled HTTP stubs for the
//! latency and hang cases mockito cannot express.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A local site whose inner pages respond slowly.
///
/// `GET /` returns an HTML page linking to `/p0` .. `/p{n-1}` immediately;
/// every other path sleeps for `latency` before answering 200. Requests are
/// counted on arrival, so aborted fetches are visible too.
pub struct SlowSite {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    handle: JoinHandle<()>,
}

impl SlowSite {
    pub async fn start(link_count: usize, latency: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind slow site");
        let addr = listener.local_addr().expect("local addr");
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

        let hits_for_server = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let hits = Arc::clone(&hits_for_server);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();

                    if let Ok(mut hits) = hits.lock() {
                        *hits.entry(path.clone()).or_insert(0) += 1;
                    }

                    let body = if path == "/" {
                        let links: String = (0..link_count)
                            .map(|i| format!("<li><a href=\"/p{i}\">page {i}</a></li>"))
                            .collect();
                        format!("<html><body><ul>{links}</ul></body></html>")
                    } else {
                        tokio::time::sleep(latency).await;
                        "<html><body>leaf</body></html>".to_string()
                    };

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, hits, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Arrival count for one path.
    pub fn hits_for(&self, path: &str) -> usize {
        self.hits
            .lock()
            .map(|hits| hits.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Drop for SlowSite {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A server that accepts connections and never sends a byte: the timeout
/// case.
pub struct HangingServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl HangingServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind hanging server");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                // Hold the socket open without ever responding.
                open.push(stream);
            }
        });
        Self { addr, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for HangingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
