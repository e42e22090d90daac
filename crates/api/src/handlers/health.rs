use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

/// 存活检查，附带数据库和缓存的健康状态
///
/// 缓存只影响读取延迟，数据库不可用时返回 503。
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = state.store().durable_healthy().await;
    let cache = state.store().cache_healthy().await;

    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(json!({
            "status": label,
            "database": database,
            "cache": cache,
            "uptime_seconds": state.metrics.uptime().as_secs(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "tutor",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
