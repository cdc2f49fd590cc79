//! API 에러 응답.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flow_analytics::EvaluationError;
use flow_core::StorageError;
use serde::{Deserialize, Serialize};
use tracing::error;
use validator::ValidationErrors;

/// JSON 에러 본문 `{ code, message }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// 에러 코드
    pub code: String,
    /// 에러 메시지
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 상태 코드를 포함한 에러 응답
#[derive(Debug)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError::new(code, message),
        }
    }

    pub fn invalid_ticker(ticker: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_TICKER",
            format!("유효하지 않은 종목코드: {} (6자리 영숫자)", ticker),
        )
    }
}

pub type ApiResult<T> = Result<T, ApiErrorResponse>;

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<EvaluationError> for ApiErrorResponse {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::InvalidTicker(ticker) => Self::invalid_ticker(&ticker),
            other => {
                error!(error = %other, "평가 실패");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EVALUATION_ERROR",
                    other.to_string(),
                )
            }
        }
    }
}

impl From<StorageError> for ApiErrorResponse {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "저장소 조회 실패");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORAGE_ERROR",
            err.to_string(),
        )
    }
}

impl From<ValidationErrors> for ApiErrorResponse {
    fn from(err: ValidationErrors) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
    }
}
