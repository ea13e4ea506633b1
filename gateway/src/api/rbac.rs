//! RBACポリシーAPI
//!
//! `argocd-rbac-cm` の `policy.csv` / `policy.default` / `scopes` を読み書きする。

use super::error::AppError;
use super::record_outcome;
use crate::audit::types::{AuditAction, AuditEvent};
use crate::common::error::GatewayError;
use crate::common::ip::ClientInfo;
use crate::store::DocumentKind;
use crate::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// RBAC ConfigMap名
pub const RBAC_CONFIGMAP: &str = "argocd-rbac-cm";

const POLICY_KEY: &str = "policy.csv";
const POLICY_DEFAULT_KEY: &str = "policy.default";
const SCOPES_KEY: &str = "scopes";

/// RBAC設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacConfig {
    /// CSV形式のポリシー
    #[serde(default)]
    pub policy: String,
    /// 既定ロール
    #[serde(default)]
    pub policy_default: String,
    /// OIDCスコープ
    #[serde(default)]
    pub scopes: String,
}

/// GET /api/v1/settings/rbac
pub async fn get_rbac(State(state): State<AppState>) -> Result<Json<RbacConfig>, AppError> {
    let document = state
        .store
        .get(DocumentKind::ConfigMap, RBAC_CONFIGMAP)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("ConfigMap {RBAC_CONFIGMAP} not found")))?;

    Ok(Json(RbacConfig {
        policy: document.get(POLICY_KEY).unwrap_or_default().to_string(),
        policy_default: document.get(POLICY_DEFAULT_KEY).unwrap_or_default().to_string(),
        scopes: document.get(SCOPES_KEY).unwrap_or_default().to_string(),
    }))
}

/// PUT /api/v1/settings/rbac
///
/// `policy.csv` は常に置き換え、`policy.default` と `scopes` は空でなければ置き換える。
pub async fn update_rbac(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(config): Json<RbacConfig>,
) -> Result<Json<RbacConfig>, AppError> {
    let mut document = state
        .store
        .get(DocumentKind::ConfigMap, RBAC_CONFIGMAP)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("ConfigMap {RBAC_CONFIGMAP} not found")))?;

    let before = json!({
        POLICY_KEY: document.get(POLICY_KEY).unwrap_or_default(),
        POLICY_DEFAULT_KEY: document.get(POLICY_DEFAULT_KEY).unwrap_or_default(),
    });

    document
        .data
        .insert(POLICY_KEY.to_string(), config.policy.clone());
    if !config.policy_default.is_empty() {
        document
            .data
            .insert(POLICY_DEFAULT_KEY.to_string(), config.policy_default.clone());
    }
    if !config.scopes.is_empty() {
        document
            .data
            .insert(SCOPES_KEY.to_string(), config.scopes.clone());
    }

    let event = AuditEvent::new(AuditAction::RbacUpdate, "rbac", "permissions")
        .client(&client)
        .before(before)
        .after(json!({
            POLICY_KEY: config.policy,
            POLICY_DEFAULT_KEY: config.policy_default,
        }));
    let result = state.store.update(&document).await.map_err(GatewayError::from);
    record_outcome(&state, event, result).await?;

    Ok(Json(config))
}
