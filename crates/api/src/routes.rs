use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tutor_dispatcher::TaskDispatcher;
use tutor_infrastructure::{MetricsCollector, RateLimiter, TaskStore};

use crate::handlers::{
    admin::{metrics_snapshot, prometheus_metrics},
    health::health_check,
    tasks::{get_history, get_task_status, submit_task},
};
use crate::middleware::require_admin_token;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TaskDispatcher>,
    /// 与调度器共享同一个限流器
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsCollector>,
    pub prometheus: Option<PrometheusHandle>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn store(&self) -> &Arc<TaskStore> {
        self.dispatcher.store()
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    let admin = Router::new()
        .route("/metrics", get(metrics_snapshot))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .route_layer(from_fn_with_state(state.clone(), require_admin_token));

    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 任务API
        .route("/api/tasks", post(submit_task))
        .route("/api/tasks/{task_id}", get(get_task_status))
        .route("/api/history", get(get_history))
        // 管理API
        .nest("/api/admin", admin)
        .with_state(state)
}
