//! Mock stateless endpoint.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct MockHttpServer {
    base_url: String,
    calls: Arc<AtomicUsize>,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/{operation}", post(handle_operation))
            .with_state(calls.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            calls,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn handle_operation(
    State(calls): State<Arc<AtomicUsize>>,
    Path(operation): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"via": "http", "op": operation, "body": body}))
}
