//! API 라우트.

pub mod flow;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub use flow::flow_router;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/flow", flow_router())
}
