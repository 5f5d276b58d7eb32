use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::mover::AdmissionError;
use crate::service::ServiceError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("未授权: 缺少或错误的 API key")]
    Unauthorized,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Service(ServiceError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Admission(AdmissionError::Busy { .. })) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Service(ServiceError::Admission(AdmissionError::SourceUnavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Service(ServiceError::Source(SourceError::Transport(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Service(ServiceError::Source(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!("请求处理失败: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
