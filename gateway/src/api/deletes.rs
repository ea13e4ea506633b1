//! Application / Project 削除の転送（キャプチャモード）
//!
//! `/api/v1/applications/` と `/api/v1/projects/` 配下の DELETE は全て監査する。
//! リソース名はプレフィックス以降のサブパス全体（例: `guestbook/resource`）。

use super::error::AppError;
use super::proxy::read_body;
use crate::audit::types::{AuditAction, AuditEvent};
use crate::common::ip::ClientInfo;
use crate::AppState;
use axum::{
    extract::{Path, Request, State},
    response::{IntoResponse, Response},
};
use serde_json::json;

async fn capture_delete(
    state: AppState,
    client: ClientInfo,
    request: Request,
    action: AuditAction,
    resource_type: &str,
    name: String,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let body = read_body(body).await?;
    let captured = state.proxy.capture(&parts, body, &client).await?;

    let event = AuditEvent::new(action, resource_type, name.clone()).client(&client);
    let event = if captured.is_success() {
        event.before(json!({ "name": name }))
    } else {
        event
            .failed()
            .detail("statusCode", json!(captured.status.as_u16()))
    };
    state.audit.record(event).await;

    Ok(captured.into_response())
}

/// DELETE /api/v1/applications/*name
pub async fn delete_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
    client: ClientInfo,
    request: Request,
) -> Result<Response, AppError> {
    capture_delete(
        state,
        client,
        request,
        AuditAction::ApplicationDelete,
        "application",
        name,
    )
    .await
}

/// DELETE /api/v1/projects/*name
pub async fn delete_project(
    State(state): State<AppState>,
    Path(name): Path<String>,
    client: ClientInfo,
    request: Request,
) -> Result<Response, AppError> {
    capture_delete(
        state,
        client,
        request,
        AuditAction::ProjectDelete,
        "project",
        name,
    )
    .await
}
