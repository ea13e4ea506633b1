//! ローカルアカウントAPI
//!
//! アカウント定義は `argocd-cm` の `accounts.<name>` / `accounts.<name>.enabled`、
//! パスワードハッシュは `argocd-secret` の `accounts.<name>.password` に置く。

use super::error::AppError;
use super::record_outcome;
use crate::audit::types::{AuditAction, AuditEvent};
use crate::common::error::GatewayError;
use crate::common::ip::ClientInfo;
use crate::store::{ConfigDocument, DocumentKind};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;

/// アカウント定義を持つConfigMap
pub const ACCOUNTS_CONFIGMAP: &str = "argocd-cm";
/// パスワードハッシュを持つSecret
pub const ACCOUNTS_SECRET: &str = "argocd-secret";

const ADMIN_ACCOUNT: &str = "admin";
const DEFAULT_CAPABILITIES: &str = "apiKey,login";
const ACCOUNT_PREFIX: &str = "accounts.";
const ENABLED_SUFFIX: &str = ".enabled";

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 63;

fn account_key(name: &str) -> String {
    format!("{ACCOUNT_PREFIX}{name}")
}

fn enabled_key(name: &str) -> String {
    format!("{ACCOUNT_PREFIX}{name}{ENABLED_SUFFIX}")
}

fn password_key(name: &str) -> String {
    format!("{ACCOUNT_PREFIX}{name}.password")
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._-]*[a-zA-Z0-9])?$")
            .unwrap_or_else(|e| unreachable!("account name pattern is valid: {e}"))
    })
}

/// アカウント名の検証（英数字で始まり英数字で終わる、3〜63文字）
pub fn validate_account_name(name: &str) -> Result<(), GatewayError> {
    if name.is_empty() {
        return Err(GatewayError::validation("Account name is required"));
    }
    if name.len() < NAME_MIN_LEN {
        return Err(GatewayError::validation(
            "Account name must be at least 3 characters",
        ));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(GatewayError::validation(
            "Account name must be less than 63 characters",
        ));
    }
    if !name_pattern().is_match(name) {
        return Err(GatewayError::validation(
            "Account name must start and end with alphanumeric, and contain only letters, \
             numbers, hyphens, underscores, or periods",
        ));
    }
    Ok(())
}

/// アカウント情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// アカウント名
    pub name: String,
    /// 有効か
    pub enabled: bool,
    /// 権限（`apiKey` / `login`）
    pub capabilities: Vec<String>,
}

/// アカウント一覧
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountList {
    /// admin を先頭にした一覧
    pub items: Vec<Account>,
}

fn split_capabilities(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// `argocd-cm` のデータからアカウント一覧を組み立てる
pub fn list_from_document(document: Option<&ConfigDocument>) -> Vec<Account> {
    let admin_enabled = document
        .and_then(|d| d.get(&enabled_key(ADMIN_ACCOUNT)))
        .map_or(true, |v| v != "false");
    let mut items = vec![Account {
        name: ADMIN_ACCOUNT.to_string(),
        enabled: admin_enabled,
        capabilities: split_capabilities(DEFAULT_CAPABILITIES),
    }];

    let Some(document) = document else {
        return items;
    };
    for (key, value) in &document.data {
        let Some(name) = key.strip_prefix(ACCOUNT_PREFIX) else {
            continue;
        };
        if name.is_empty() || name == ADMIN_ACCOUNT || name.ends_with(ENABLED_SUFFIX) {
            continue;
        }
        items.push(Account {
            name: name.to_string(),
            enabled: document.get(&enabled_key(name)) == Some("true"),
            capabilities: split_capabilities(value),
        });
    }
    items
}

/// GET /api/v1/settings/accounts
pub async fn list_accounts(State(state): State<AppState>) -> Result<Json<AccountList>, AppError> {
    let document = state
        .store
        .get(DocumentKind::ConfigMap, ACCOUNTS_CONFIGMAP)
        .await?;
    Ok(Json(AccountList {
        items: list_from_document(document.as_ref()),
    }))
}

/// アカウント作成リクエスト
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    /// アカウント名
    #[serde(default)]
    pub name: String,
    /// 平文パスワード（保存前にbcryptでハッシュ化）
    #[serde(default)]
    pub password: String,
    /// 有効化するか
    #[serde(default)]
    pub enabled: bool,
}

/// POST /api/v1/settings/accounts
pub async fn create_account(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    validate_account_name(&request.name)?;
    if request.password.is_empty() {
        return Err(GatewayError::validation("Password is required").into());
    }

    let mut config = state
        .store
        .get_or_empty(DocumentKind::ConfigMap, ACCOUNTS_CONFIGMAP)
        .await?;
    if request.name == ADMIN_ACCOUNT || config.get(&account_key(&request.name)).is_some() {
        return Err(GatewayError::Conflict("Account already exists".to_string()).into());
    }

    let hash = hash_password(&request.password).await?;
    let enabled = request.enabled.to_string();
    config
        .data
        .insert(account_key(&request.name), DEFAULT_CAPABILITIES.to_string());
    config
        .data
        .insert(enabled_key(&request.name), enabled);

    let event = AuditEvent::new(AuditAction::AccountCreate, "account", request.name.clone())
        .client(&client)
        .after(json!({
            "name": request.name,
            "enabled": request.enabled,
            "capabilities": split_capabilities(DEFAULT_CAPABILITIES),
        }));
    let result = write_account(&state, &config, &request.name, Some(hash)).await;
    record_outcome(&state, event, result).await?;

    tracing::info!(account = %request.name, "local account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "name": request.name,
            "message": "Account created successfully",
        })),
    ))
}

async fn hash_password(password: &str) -> Result<String, GatewayError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| GatewayError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| GatewayError::Internal(format!("failed to hash password: {e}")))
}

/// ConfigMapを書き、続けてSecretのパスワードを設定（`None` なら削除）する
async fn write_account(
    state: &AppState,
    config: &ConfigDocument,
    name: &str,
    password_hash: Option<String>,
) -> Result<(), GatewayError> {
    state.store.save(config).await?;

    let secret = state
        .store
        .get(DocumentKind::Secret, ACCOUNTS_SECRET)
        .await?;
    match (secret, password_hash) {
        (secret, Some(hash)) => {
            let mut secret =
                secret.unwrap_or_else(|| ConfigDocument::secret(ACCOUNTS_SECRET));
            secret.data.insert(password_key(name), hash);
            state.store.save(&secret).await?;
        }
        (Some(mut secret), None) => {
            if secret.data.remove(&password_key(name)).is_some() {
                state.store.update(&secret).await?;
            }
        }
        (None, None) => {}
    }
    Ok(())
}

/// アカウント削除クエリ
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAccountQuery {
    /// 削除対象のアカウント名
    pub name: Option<String>,
}

/// DELETE /api/v1/settings/accounts?name=<name>
pub async fn delete_account(
    State(state): State<AppState>,
    client: ClientInfo,
    Query(query): Query<DeleteAccountQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = query
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::validation("Account name is required"))?;
    if name == ADMIN_ACCOUNT {
        return Err(GatewayError::Forbidden("Cannot delete admin account".to_string()).into());
    }

    let not_found = || GatewayError::NotFound(format!("Account '{name}' not found"));
    let mut config = state
        .store
        .get(DocumentKind::ConfigMap, ACCOUNTS_CONFIGMAP)
        .await?
        .ok_or_else(not_found)?;
    let capabilities = config
        .data
        .remove(&account_key(&name))
        .ok_or_else(not_found)?;
    let enabled = config.data.remove(&enabled_key(&name)).as_deref() == Some("true");

    let event = AuditEvent::new(AuditAction::AccountDelete, "account", name.clone())
        .client(&client)
        .before(json!({
            "name": name,
            "enabled": enabled,
            "capabilities": split_capabilities(&capabilities),
        }));
    let result = write_account(&state, &config, &name, None).await;
    record_outcome(&state, event, result).await?;

    tracing::info!(account = %name, "local account deleted");
    Ok(Json(json!({
        "name": name,
        "message": "Account deleted successfully",
    })))
}
