use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::info;
use tutor_core::{
    models::{EndpointClass, TaskStatus, TaskStatusRecord},
    TutorError,
};
use tutor_dispatcher::SubmitRequest;

use crate::{error::ApiResult, routes::AppState};

/// 请求未携带身份时使用的默认值
pub const DEFAULT_USER: &str = "default_user";
pub const DEFAULT_SCHOOL: &str = "default_school";

/// 任务提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub user_id: Option<String>,
    pub school_id: Option<String>,
    /// 图片内容，base64 编码，可带 `data:image/...;base64,` 前缀
    pub image_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct IdentityQuery {
    pub user_id: Option<String>,
}

/// 历史查询参数
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub tasks: Vec<TaskStatusRecord>,
}

fn identity_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, TutorError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| TutorError::Validation(format!("image_base64 不是合法的base64: {}", e)))
}

/// 提交图片分析任务
pub async fn submit_task(
    State(state): State<AppState>,
    payload: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitTaskResponse>)> {
    let Json(request) = payload?;
    let user_id = identity_or(request.user_id, DEFAULT_USER);
    let school_id = identity_or(request.school_id, DEFAULT_SCHOOL);
    let image = decode_image(&request.image_base64)?;

    let task_id = state
        .dispatcher
        .submit(SubmitRequest {
            user_id: user_id.clone(),
            school_id,
            image,
        })
        .await?;

    info!(task_id = %task_id, user_id = %user_id, "任务已受理");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}

/// 查询任务状态
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    query: Result<Query<IdentityQuery>, QueryRejection>,
) -> ApiResult<Json<TaskStatusRecord>> {
    let Query(query) = query?;
    let user_id = identity_or(query.user_id, DEFAULT_USER);
    state.rate_limiter.check(&user_id, EndpointClass::Status)?;

    let task = state.store().get(&task_id).await?;
    Ok(Json(task.to_status_record()))
}

/// 查询用户的任务历史，最新的在前
pub async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<HistoryResponse>> {
    let Query(query) = query?;
    let user_id = identity_or(query.user_id, DEFAULT_USER);
    state.rate_limiter.check(&user_id, EndpointClass::History)?;

    let tasks = state
        .store()
        .history(&user_id, query.limit, query.offset)
        .await?;

    Ok(Json(HistoryResponse {
        user_id,
        tasks: tasks.iter().map(|task| task.to_status_record()).collect(),
    }))
}
