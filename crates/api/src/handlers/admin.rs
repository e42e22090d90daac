use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use tutor_core::models::MetricsSnapshot;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

/// 当前进程的指标快照
pub async fn metrics_snapshot(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Prometheus 文本格式的指标
pub async fn prometheus_metrics(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let handle = state
        .prometheus
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Prometheus导出器未安装".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
