use crate::service::{AuditError, CatalogError, DraftError, ExtractionError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("catalog reload failed: {0}")]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("bill extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("report export failed: {0}")]
    Report(#[from] csv::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Audit(AuditError::CatalogUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Draft(DraftError::InvalidTone(_)) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Draft(_) => StatusCode::BAD_GATEWAY,
            ApiError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Catalog(_) | ApiError::Report(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("请求失败 ({}): {}", status, self);
        } else {
            tracing::warn!("请求被拒绝 ({}): {}", status, self);
        }
        let body = ErrorResponse {
            success: false,
            message: format!("Error: {}", self),
        };
        (status, Json(body)).into_response()
    }
}
