//! Gate liveness probe. Mounted outside the gate so orchestrators can poll it
//! without a session.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub const HEALTH_PATH: &str = "/_gate/health";

pub fn router() -> Router<AppState> {
    Router::new().route(HEALTH_PATH, get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
