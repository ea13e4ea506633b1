//! 監査ログ参照API

use super::error::AppError;
use crate::audit::types::{AuditEventList, AuditFilter, Severity};
use crate::common::error::GatewayError;
use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// クエリパラメータ
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryParams {
    /// 実行ユーザー
    pub user: Option<String>,
    /// アクション名
    pub action: Option<String>,
    /// リソース種別
    pub resource_type: Option<String>,
    /// リソース名
    pub resource_name: Option<String>,
    /// 重要度
    pub severity: Option<String>,
    /// 成否（`true` 以外は失敗扱い）
    pub success: Option<String>,
    /// 開始時刻（RFC 3339）
    pub start_date: Option<String>,
    /// 終了時刻（RFC 3339）
    pub end_date: Option<String>,
    /// 最大件数
    pub limit: Option<usize>,
    /// スキップ件数
    pub offset: Option<usize>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_time(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, GatewayError> {
    non_empty(value)
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| GatewayError::validation(format!("{field} must be RFC 3339: {e}")))
        })
        .transpose()
}

impl AuditQueryParams {
    /// フィルタに変換する。未知の重要度は `Ok(None)`（一致なし）
    pub fn into_filter(self) -> Result<Option<AuditFilter>, GatewayError> {
        let severity = match non_empty(self.severity) {
            Some(value) => match Severity::parse(&value) {
                Some(severity) => Some(severity),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(AuditFilter {
            user: non_empty(self.user),
            action: non_empty(self.action),
            resource_type: non_empty(self.resource_type),
            resource_name: non_empty(self.resource_name),
            severity,
            success: non_empty(self.success).map(|v| v == "true"),
            start: parse_time("startDate", self.start_date)?,
            end: parse_time("endDate", self.end_date)?,
            offset: self.offset,
            limit: self.limit,
        }))
    }
}

/// GET /api/v1/settings/audit
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditEventList>, AppError> {
    let Some(filter) = params.into_filter()? else {
        return Ok(Json(AuditEventList::empty()));
    };
    Ok(Json(state.audit.query(&filter).await?))
}
