//! # Tutor API
//!
//! 图片解题服务的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `POST /api/tasks` - 提交图片，返回 202 和任务ID
//! - `GET /api/tasks/{task_id}` - 轮询任务状态
//! - `GET /api/history` - 用户任务历史（`user_id`、`limit`、`offset`）
//! - `GET /health` - 健康检查
//! - `GET /api/admin/metrics` - 指标快照（需要 `x-admin-token`）
//! - `GET /api/admin/metrics/prometheus` - Prometheus 文本格式指标
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "error": {
//!     "message": "请求过于频繁: submit, 请在 42 秒后重试",
//!     "type": "rate_limited",
//!     "code": 429,
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! 限流返回 429 并带 `Retry-After`，参数错误 400，任务不存在 404，
//! 请求体超过 `api.max_request_bytes` 返回 413。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::{extract::DefaultBodyLimit, middleware::from_fn_with_state, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tutor_core::config::ApiConfig;

use middleware::{cors_layer, trace_layer, track_metrics};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    let metrics = state.metrics.clone();

    // 先添加的层在内侧，指标中间件能看到 413 响应
    let app = create_routes(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_request_bytes))
        .layer(from_fn_with_state(metrics, track_metrics))
        .layer(trace_layer());

    if config.cors_enabled {
        app.layer(cors_layer(&config.cors_origins))
    } else {
        app
    }
}
