//! Test helpers for route tests
//!
//! Builds an [`AppState`] over the in-memory store, object store and a
//! recording dispatcher, and drives routers with `tower::ServiceExt::oneshot`.
//!
//! # Examples
//!
//! ```rust,ignore
//! let app = TestApp::new();
//! let links = seed_record(&app.store, "123", 2).await;
//! let (status, body) = send(app.router(), get("/records/123")).await;
//! ```

#![allow(clippy::unwrap_used)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crate::catalog::SruClient;
use crate::db::MemoryStore;
use crate::features::{self, AppState};
use crate::storage::MemoryObjectStore;
use crate::testing::RecordingDispatcher;

/// Nothing listens on the discard port, so an unconfigured SRU call fails fast
const UNREACHABLE_SRU: &str = "http://127.0.0.1:9/sru/dnb";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_sru_base_url(UNREACHABLE_SRU)
    }

    pub fn with_sru_base_url(base_url: &str) -> Self {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new("dnbkb-test"));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sru = SruClient::with_client(reqwest::Client::new(), base_url);
        let state = AppState::new(store.clone(), objects.clone(), sru, dispatcher.clone());

        Self {
            store,
            objects,
            dispatcher,
            state,
        }
    }

    pub fn router(&self) -> Router {
        features::router(self.state.clone())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send one request and decode the JSON body (`Null` when empty or not JSON)
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
