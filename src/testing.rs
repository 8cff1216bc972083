//! Request helpers shared by handler tests.

use axum::body::{to_bytes, Body};
use axum::extract::FromRef;
use axum::http::Request;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::JwtKeys;
use crate::state::AppState;

/// Sends one JSON request and returns the status with the parsed body
/// (`Value::Null` when the body is empty or not JSON).
pub async fn call(app: Router, method: &str, uri: &str, token: Option<&str>, body: Value) -> (u16, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let body = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    let res = app.oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status().as_u16();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

pub fn token_for(state: &AppState, user: Uuid) -> String {
    JwtKeys::from_ref(state).sign_access(user).unwrap()
}
