use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};
use tutor_core::models::EndpointClass;
use tutor_infrastructure::MetricsCollector;

use crate::{error::ApiError, routes::AppState};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// 指标中使用的端点名称
pub fn endpoint_name(method: &Method, matched_path: Option<&str>) -> String {
    match (method, matched_path) {
        (&Method::POST, Some("/api/tasks")) => EndpointClass::Submit.as_str().to_string(),
        (_, Some("/api/tasks/{task_id}")) => EndpointClass::Status.as_str().to_string(),
        (_, Some("/api/history")) => EndpointClass::History.as_str().to_string(),
        (_, Some("/health")) => "health".to_string(),
        (_, Some(path)) if path.starts_with("/api/admin") => "admin".to_string(),
        (_, Some(path)) => path.to_string(),
        (_, None) => "unmatched".to_string(),
    }
}

/// 记录每个请求的次数、耗时和错误
pub async fn track_metrics(
    State(metrics): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = endpoint_name(
        request.method(),
        request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str),
    );
    let start = Instant::now();

    let response = next.run(request).await;
    let elapsed = start.elapsed();

    metrics.record_request(&endpoint);
    metrics.record_response_time(&endpoint, elapsed);
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        metrics.record_error(&endpoint);
    }

    debug!(
        endpoint = %endpoint,
        status = status.as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "请求处理完成"
    );
    response
}

/// 管理接口的共享令牌校验；未配置令牌时一律拒绝
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Forbidden);
    };

    let provided = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .map(|value| value.as_bytes());
    if !provided.is_some_and(|token| tokens_match(token, expected.as_bytes())) {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// 比较耗时与首个不同字节的位置无关，只暴露长度
fn tokens_match(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("忽略无效的CORS来源: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_names() {
        assert_eq!(endpoint_name(&Method::POST, Some("/api/tasks")), "submit");
        assert_eq!(
            endpoint_name(&Method::GET, Some("/api/tasks/{task_id}")),
            "status"
        );
        assert_eq!(endpoint_name(&Method::GET, Some("/api/history")), "history");
        assert_eq!(
            endpoint_name(&Method::GET, Some("/api/admin/metrics")),
            "admin"
        );
        assert_eq!(endpoint_name(&Method::GET, None), "unmatched");
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"s3cret", b"s3cret"));
        assert!(!tokens_match(b"s3creT", b"s3cret"));
        assert!(!tokens_match(b"s3cre", b"s3cret"));
        assert!(!tokens_match(b"", b"s3cret"));
    }
}
