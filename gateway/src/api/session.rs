//! ログイン転送（キャプチャモード）
//!
//! `POST /api/v1/session` を上流に転送し、上流のステータスで `auth.login` を記録する。

use super::error::AppError;
use super::proxy::read_body;
use crate::audit::types::{AuditAction, AuditEvent, Severity, UNKNOWN_USER};
use crate::common::ip::ClientInfo;
use crate::AppState;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: Option<String>,
}

/// ログインボディからユーザー名を取り出す（解釈できなければ `unknown`）
pub fn login_username(body: &[u8]) -> String {
    serde_json::from_slice::<LoginRequest>(body)
        .ok()
        .and_then(|req| req.username)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

/// POST /api/v1/session
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let body = read_body(body).await?;
    let username = login_username(&body);

    let captured = state.proxy.capture(&parts, body, &client).await?;
    let success = captured.is_success();

    let event = AuditEvent::new(AuditAction::Login, "session", "login")
        .user(username.clone())
        .client(&client)
        .outcome(success)
        .severity(if success {
            Severity::Info
        } else {
            Severity::Warning
        })
        .after(json!({
            "username": username,
            "statusCode": captured.status.as_u16(),
            "ipAddress": client.ip,
        }));
    state.audit.record(event).await;

    Ok(captured.into_response())
}
