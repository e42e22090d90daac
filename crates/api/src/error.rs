use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};
use tutor_core::TutorError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Tutor(#[from] TutorError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("请求体过大: {0}")]
    PayloadTooLarge(String),

    #[error("缺少或错误的管理员令牌")]
    Unauthorized,

    #[error("管理接口未启用")]
    Forbidden,

    #[error("服务不可用: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Tutor(err) => match err {
                TutorError::Validation(_) => StatusCode::BAD_REQUEST,
                TutorError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
                TutorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                TutorError::MessageQueue(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::Tutor(err) => err.error_type(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 内部错误不向调用方暴露细节
        let message = if status.is_server_error() {
            error!("请求处理失败: {}", self);
            match &self {
                ApiError::Tutor(TutorError::MessageQueue(_)) | ApiError::Unavailable(_) => {
                    self.to_string()
                }
                _ => "服务器内部错误".to_string(),
            }
        } else {
            warn!("请求被拒绝: {} - {}", status, self);
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": self.error_type(),
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        let mut response = (status, body).into_response();
        if let ApiError::Tutor(TutorError::RateLimited {
            retry_after_seconds,
            ..
        }) = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(TutorError::Validation("empty".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(TutorError::TaskNotFound { id: "t1".into() }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(TutorError::RateLimited {
                    endpoint: "submit".into(),
                    retry_after_seconds: 12,
                }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::from(TutorError::DatabaseOperation("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{err}");
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::from(TutorError::RateLimited {
            endpoint: "submit".into(),
            retry_after_seconds: 42,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response =
            ApiError::from(TutorError::DatabaseOperation("password=hunter2".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "store_error");
        assert_eq!(body["error"]["code"], 500);
        assert!(!body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("hunter2"));
    }
}
