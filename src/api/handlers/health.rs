use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::types::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state
        .db
        .lock()
        .query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
        .is_ok();
    Json(json!({
        "success": true,
        "status": if db_ok { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}
