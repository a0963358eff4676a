//! Origin failures through the full router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use serde_json::{Value, json};
use storefront_auth::{IdentityVerifier, VerifyError};
use storefront_server::{AppConfig, AppState, CacheBackend, build_app};
use storefront_storage::{Document, DocumentStore, DocumentStream, ListQuery, StorageError};
use tower::ServiceExt;

struct AcceptAll;

#[async_trait]
impl IdentityVerifier for AcceptAll {
    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        Ok(token.to_string())
    }
}

enum Behavior {
    Stall,
    Fail,
}

struct BadStore(Behavior);

#[async_trait]
impl DocumentStore for BadStore {
    fn list_collection<'a>(&'a self, _query: &'a ListQuery) -> DocumentStream<'a> {
        futures_util::stream::once(async move {
            match self.0 {
                Behavior::Stall => std::future::pending::<Result<Document, StorageError>>().await,
                Behavior::Fail => Err(StorageError::query_error(
                    "relation \"documents\" does not exist",
                )),
            }
        })
        .boxed()
    }

    async fn get_document(
        &self,
        _collection: &str,
        _id: &str,
    ) -> Result<Option<Document>, StorageError> {
        match self.0 {
            Behavior::Stall => std::future::pending().await,
            Behavior::Fail => Err(StorageError::connection_error("pool closed")),
        }
    }

    fn backend_name(&self) -> &'static str {
        "bad"
    }
}

fn app(behavior: Behavior) -> axum::Router {
    let mut cfg = AppConfig::default();
    cfg.storage.query_timeout_ms = 50;
    let state = AppState::new(
        &cfg,
        Arc::new(CacheBackend::new_local()),
        Arc::new(BadStore(behavior)),
        Arc::new(AcceptAll),
    );
    build_app(state, cfg.server.body_limit_bytes)
}

async fn call(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = tokio::time::timeout(Duration::from_secs(2), app.oneshot(request))
        .await
        .expect("response within budget")
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn stalled_origin_is_a_gateway_timeout() {
    let (status, body) = call(app(Behavior::Stall), get("/api/categories/getCategories")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body, json!({"error": "origin query timed out"}));
}

#[tokio::test]
async fn failing_origin_does_not_leak_details() {
    let (status, body) = call(app(Behavior::Fail), get("/api/categories/getProducts")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "origin query failed"}));
}

#[tokio::test]
async fn failing_profile_read_is_an_error_not_a_missing_user() {
    let request = Request::builder()
        .uri("/api/user/me")
        .header("authorization", "Bearer u1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(Behavior::Fail), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "origin query failed"}));
}
