//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::common::error::{CommonError, GatewayError, StoreError};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub GatewayError);

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError(GatewayError::Store(err))
    }
}

impl From<CommonError> for AppError {
    fn from(err: CommonError) -> Self {
        AppError(GatewayError::Common(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        // Use external_message() to avoid exposing internal details (IP addresses, ports, etc.)
        let payload = match self.0.client_detail() {
            Some(detail) => json!({
                "error": self.0.external_message(),
                "message": detail,
            }),
            None => json!({
                "error": self.0.external_message()
            }),
        };

        (status, Json(payload)).into_response()
    }
}

/// 409で `{error, message}` を返す（通知サービス重複など）
pub fn conflict_response(error: &str, message: String) -> axum::response::Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": error, "message": message })),
    )
        .into_response()
}
