//! Test fixtures: synthetic JPEGs and an in-process MJPEG upstream

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

use crate::cache::demux::{EOI, SOI};

/// A fake JPEG: SOI, `payload_len` bytes that never contain 0xFF, EOI
pub(crate) fn jpeg(seed: u8, payload_len: usize) -> Vec<u8> {
    let mut image = Vec::with_capacity(payload_len + 4);
    image.extend_from_slice(&SOI);
    image.extend((0..payload_len).map(|i| (i as u8).wrapping_add(seed) & 0x7F));
    image.extend_from_slice(&EOI);
    image
}

/// Opt-in test logging, controlled by `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

enum Behavior {
    /// 200 with the body, then keep the connection open or close it
    Mjpeg { body: Vec<u8>, hold_open: bool },
    /// Empty response with the given status
    Status(u16),
}

/// Minimal HTTP/1.1 server standing in for a camera
pub(crate) struct FakeUpstream {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeUpstream {
    /// Serve the concatenated images, then hold the connection open
    pub(crate) async fn mjpeg(images: Vec<Vec<u8>>) -> Self {
        Self::spawn(Behavior::Mjpeg {
            body: images.concat(),
            hold_open: true,
        })
        .await
    }

    /// Serve the concatenated images, then close the connection
    pub(crate) async fn mjpeg_then_close(images: Vec<Vec<u8>>) -> Self {
        Self::spawn(Behavior::Mjpeg {
            body: images.concat(),
            hold_open: false,
        })
        .await
    }

    /// Answer every request with `code` and no body
    pub(crate) async fn status(code: u16) -> Self {
        Self::spawn(Behavior::Status(code)).await
    }

    async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let behavior = Arc::new(behavior);

        let counter = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(serve(socket, Arc::clone(&behavior)));
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub(crate) fn url(&self) -> Url {
        format!("http://{}/stream.mjpg", self.addr).parse().unwrap()
    }

    /// Connections accepted so far
    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, behavior: Arc<Behavior>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    match behavior.as_ref() {
        Behavior::Status(code) => {
            let response = format!(
                "HTTP/1.1 {} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Behavior::Mjpeg { body, hold_open } => {
            let head = "HTTP/1.1 200 OK\r\n\
                        Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
                        Connection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in body.chunks(1000) {
                if socket.write_all(chunk).await.is_err() {
                    return;
                }
            }
            let _ = socket.flush().await;

            if *hold_open {
                std::future::pending::<()>().await;
            } else {
                let _ = socket.shutdown().await;
            }
        }
    }
}
