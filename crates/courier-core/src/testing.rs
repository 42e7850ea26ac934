//! Test helpers: a local webhook receiver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use serde_json::Value;
use tokio::sync::Mutex;

/// One POST as seen by the receiver.
#[derive(Debug, Clone)]
pub struct Received {
    pub authorization: Option<String>,
    pub body: Value,
}

/// Answers `fail_first` requests with 503, then 204.
pub struct Receiver {
    fail_first: u32,
    calls: AtomicU32,
    received: Mutex<Vec<Received>>,
}

impl Receiver {
    pub fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            calls: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests that were answered with 2xx.
    pub async fn accepted(&self) -> Vec<Received> {
        self.received.lock().await.clone()
    }
}

async fn hook(
    State(receiver): State<Arc<Receiver>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let n = receiver.calls.fetch_add(1, Ordering::SeqCst);
    if n < receiver.fail_first {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    receiver.received.lock().await.push(Received {
        authorization,
        body,
    });
    StatusCode::NO_CONTENT
}

/// Serve `receiver` on an ephemeral port; returns the hook URL.
pub async fn spawn_receiver(receiver: Arc<Receiver>) -> String {
    let app = Router::new()
        .route("/hook", post(hook))
        .route("/moved", post(|| async { axum::response::Redirect::temporary("/hook") }))
        .with_state(receiver);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/hook")
}
