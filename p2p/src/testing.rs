//! Stand-in peers for transport tests

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A request seen by a capturing peer
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub path: String,
    pub body: String,
}

#[derive(Clone)]
struct Capture {
    status: StatusCode,
    tx: mpsc::UnboundedSender<CapturedRequest>,
}

async fn capture(
    State(capture): State<Capture>,
    method: Method,
    uri: Uri,
    body: String,
) -> StatusCode {
    let _ = capture.tx.send(CapturedRequest {
        method,
        path: uri.path().to_string(),
        body,
    });
    capture.status
}

/// Answer every request with `status` and forward what was received
pub async fn spawn_capturing_server(
    status: StatusCode,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    let router = Router::new()
        .fallback(capture)
        .with_state(Capture { status, tx });

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    (addr, rx)
}

/// Address nobody listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
