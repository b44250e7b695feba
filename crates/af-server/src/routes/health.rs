//! Liveness and status endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::context::AppContext;

/// `GET /health` — constant liveness probe.
///
/// Always reports `{"ok": true}` while the process can serve requests at
/// all; the admission gate is deliberately not consulted here so load
/// balancers keep the instance in rotation while it sheds work.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// `GET /status` — current pressure readings and their ceilings.
pub async fn status(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let snapshot = ctx.health.snapshot();
    let status = if ctx.health.is_overloaded() {
        "overloaded"
    } else {
        "ok"
    };
    Json(json!({
        "status": status,
        "event_loop_delay_ms": snapshot.event_loop_delay_ms,
        "rss_bytes": snapshot.rss_bytes,
        "limits": ctx.health.limits(),
    }))
}
