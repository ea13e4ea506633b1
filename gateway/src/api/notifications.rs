//! 通知設定・通知サービスAPI
//!
//! サービス系エンドポイントは `/api/v1/notifications/services/*rest` で受け、
//! パスのセグメント数とメソッドで作成・更新・削除・疎通テストに振り分ける。

use super::error::{conflict_response, AppError};
use super::proxy::read_body;
use super::record_outcome;
use crate::audit::types::{AuditAction, AuditEvent};
use crate::common::error::GatewayError;
use crate::common::ip::ClientInfo;
use crate::notify::{
    EmailServiceRequest, ServiceDefinition, ServiceProvider, SlackServiceRequest,
    WebhookServiceRequest, NOTIFICATIONS_CONFIGMAP, NOTIFICATIONS_SECRET,
};
use crate::store::{ConfigDocument, DocumentKind};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// 通知設定（ConfigMapのデータそのもの）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// キーと値
    pub data: BTreeMap<String, String>,
}

/// 通知設定の更新リクエスト
#[derive(Debug, Deserialize)]
pub struct NotificationConfigUpdate {
    /// 置き換え後のデータ
    pub data: Option<serde_json::Map<String, Value>>,
}

/// GET /api/v1/notifications/config
pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<NotificationConfig>, AppError> {
    let data = state
        .store
        .get(DocumentKind::ConfigMap, NOTIFICATIONS_CONFIGMAP)
        .await?
        .map(|doc| doc.data)
        .unwrap_or_default();
    Ok(Json(NotificationConfig { data }))
}

/// PUT /api/v1/notifications/config
///
/// `data` の文字列値でConfigMapのデータを置き換える（文字列以外は無視）。
pub async fn update_config(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(update): Json<NotificationConfigUpdate>,
) -> Result<Json<NotificationConfig>, AppError> {
    let incoming = update
        .data
        .ok_or_else(|| GatewayError::validation("data is required"))?;
    let data: BTreeMap<String, String> = incoming
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect();

    let mut document = state
        .store
        .get_or_empty(DocumentKind::ConfigMap, NOTIFICATIONS_CONFIGMAP)
        .await?;
    let before = json!(document.data);
    document.data = data.clone();

    let event = AuditEvent::new(AuditAction::NotificationUpdate, "notification", "config")
        .client(&client)
        .before(before)
        .after(json!(data));
    let result = state
        .store
        .save(&document)
        .await
        .map(|_| ())
        .map_err(GatewayError::from);
    record_outcome(&state, event, result).await?;

    Ok(Json(NotificationConfig { data }))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::validation(format!("Invalid request body: {e}")))
}

fn validate_service_name(name: &str) -> Result<(), GatewayError> {
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(GatewayError::validation(
            "Service name may only contain letters, numbers, '-', '_' or '.'",
        ));
    }
    Ok(())
}

/// サービス系エンドポイントの振り分け
pub async fn services(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    client: ClientInfo,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let method = parts.method;

    let not_allowed = || -> Result<Response, AppError> {
        Err(GatewayError::MethodNotAllowed(format!("{method} is not supported here")).into())
    };

    match segments.as_slice() {
        [segment] => {
            let provider = ServiceProvider::parse(segment);
            if method == Method::POST {
                let Some(provider) = provider else {
                    return not_allowed();
                };
                let body = read_body(body).await?;
                match provider {
                    ServiceProvider::Slack => {
                        create_service(&state, &client, parse_body::<SlackServiceRequest>(&body)?)
                            .await
                    }
                    ServiceProvider::Webhook => {
                        create_service(
                            &state,
                            &client,
                            parse_body::<WebhookServiceRequest>(&body)?,
                        )
                        .await
                    }
                    ServiceProvider::Email => {
                        create_service(&state, &client, parse_body::<EmailServiceRequest>(&body)?)
                            .await
                    }
                }
            } else if method == Method::DELETE {
                delete_service(&state, &client, segment).await
            } else {
                not_allowed()
            }
        }
        [segment, name] if ServiceProvider::parse(segment).is_some() || *name == "test" => {
            if *name == "test" {
                if method != Method::POST {
                    return not_allowed();
                }
                let body = read_body(body).await?;
                let request = parse_body::<SlackServiceRequest>(&body)?;
                let message = state.notifier.test_slack(&request).await?;
                return Ok(test_success(message));
            }
            if method != Method::PUT {
                return not_allowed();
            }
            let body = read_body(body).await?;
            match ServiceProvider::parse(segment) {
                Some(ServiceProvider::Slack) => {
                    update_service(&state, &client, name, parse_body::<SlackServiceRequest>(&body)?)
                        .await
                }
                Some(ServiceProvider::Webhook) => {
                    update_service(
                        &state,
                        &client,
                        name,
                        parse_body::<WebhookServiceRequest>(&body)?,
                    )
                    .await
                }
                Some(ServiceProvider::Email) => {
                    update_service(&state, &client, name, parse_body::<EmailServiceRequest>(&body)?)
                        .await
                }
                None => not_allowed(),
            }
        }
        [_, "test", kind @ ("webhook" | "email")] => {
            if method != Method::POST {
                return not_allowed();
            }
            let body = read_body(body).await?;
            let message = if *kind == "webhook" {
                let request = parse_body::<WebhookServiceRequest>(&body)?;
                state.notifier.test_webhook(&request.url).await?
            } else {
                let request = parse_body::<EmailServiceRequest>(&body)?;
                state.notifier.test_email(&request).await?
            };
            Ok(test_success(message))
        }
        _ => Err(GatewayError::NotFound(format!("no notification route for '{rest}'")).into()),
    }
}

fn test_success(message: String) -> Response {
    Json(json!({ "status": "success", "message": message })).into_response()
}

/// ConfigMapを保存し、秘匿値があればSecretにも書く
async fn save_service(
    state: &AppState,
    config: &ConfigDocument,
    secret_entry: Option<(String, String)>,
) -> Result<(), GatewayError> {
    state.store.save(config).await?;
    if let Some((key, value)) = secret_entry {
        let mut secret = state
            .store
            .get_or_empty(DocumentKind::Secret, NOTIFICATIONS_SECRET)
            .await?;
        secret.data.insert(key, value);
        state.store.save(&secret).await?;
    }
    Ok(())
}

fn secret_entry<S: ServiceDefinition>(service: &S, name: &str) -> Option<(String, String)> {
    service
        .provider()
        .secret_key(name)
        .zip(service.secret_value().map(str::to_string))
}

async fn create_service<S: ServiceDefinition>(
    state: &AppState,
    client: &ClientInfo,
    service: S,
) -> Result<Response, AppError> {
    service.validate(true)?;
    let name = service.name().to_string();
    validate_service_name(&name)?;
    let provider = service.provider();

    let mut config = state
        .store
        .get_or_empty(DocumentKind::ConfigMap, NOTIFICATIONS_CONFIGMAP)
        .await?;
    let key = provider.service_key(&name);
    if config.data.contains_key(&key) {
        return Ok(conflict_response(
            "Service already exists",
            provider.duplicate_message(&name),
        ));
    }
    config.data.insert(key, service.render(&name)?);

    let event = AuditEvent::new(
        AuditAction::NotificationServiceCreate,
        "notification",
        format!("{provider}/{name}"),
    )
    .client(client)
    .after(service.summary(&name));
    let result = save_service(state, &config, secret_entry(&service, &name)).await;
    record_outcome(state, event, result).await?;

    info!(%provider, service = %name, "notification service created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "created", "name": name })),
    )
        .into_response())
}

async fn update_service<S: ServiceDefinition>(
    state: &AppState,
    client: &ClientInfo,
    name: &str,
    service: S,
) -> Result<Response, AppError> {
    service.validate(false)?;
    let provider = service.provider();
    let not_found = || GatewayError::NotFound("Service not found".to_string());

    let mut config = state
        .store
        .get(DocumentKind::ConfigMap, NOTIFICATIONS_CONFIGMAP)
        .await?
        .ok_or_else(not_found)?;
    let key = provider.service_key(name);
    let previous = config.data.get(&key).cloned().ok_or_else(not_found)?;
    config.data.insert(key, service.render(name)?);

    let event = AuditEvent::new(
        AuditAction::NotificationServiceUpdate,
        "notification",
        format!("{provider}/{name}"),
    )
    .client(client)
    .before(json!({ "type": provider.as_str(), "name": name, "config": previous }))
    .after(service.summary(name));
    let result = save_service(state, &config, secret_entry(&service, name)).await;
    record_outcome(state, event, result).await?;

    info!(%provider, service = %name, "notification service updated");
    Ok(Json(json!({ "status": "updated", "name": name })).into_response())
}

async fn delete_service(
    state: &AppState,
    client: &ClientInfo,
    name: &str,
) -> Result<Response, AppError> {
    let not_found = || GatewayError::NotFound("Service not found".to_string());
    let mut config = state
        .store
        .get(DocumentKind::ConfigMap, NOTIFICATIONS_CONFIGMAP)
        .await?
        .ok_or_else(not_found)?;
    let (provider, previous) = ServiceProvider::ALL
        .iter()
        .find_map(|p| config.data.remove(&p.service_key(name)).map(|v| (*p, v)))
        .ok_or_else(not_found)?;

    let event = AuditEvent::new(
        AuditAction::NotificationServiceDelete,
        "notification",
        format!("{provider}/{name}"),
    )
    .client(client)
    .before(json!({ "type": provider.as_str(), "name": name, "config": previous }));
    let result = state
        .store
        .update(&config)
        .await
        .map(|_| ())
        .map_err(GatewayError::from);
    record_outcome(state, event, result).await?;

    if let Some(secret_key) = provider.secret_key(name) {
        remove_secret_key(state, &secret_key).await;
    }

    info!(%provider, service = %name, "notification service deleted");
    Ok(Json(json!({ "status": "deleted", "name": name })).into_response())
}

/// 秘匿値の削除はベストエフォート
async fn remove_secret_key(state: &AppState, key: &str) {
    let secret = match state
        .store
        .get(DocumentKind::Secret, NOTIFICATIONS_SECRET)
        .await
    {
        Ok(Some(secret)) => secret,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, key, "failed to read notification secret");
            return;
        }
    };
    let mut secret = secret;
    if secret.data.remove(key).is_none() {
        return;
    }
    if let Err(e) = state.store.update(&secret).await {
        warn!(error = %e, key, "failed to remove notification secret key");
    }
}
