//! 監査イベントの型定義

use crate::common::ip::ClientInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 作成・更新の成功
    Info,
    /// 削除の成功、ログイン失敗
    Warning,
    /// 変更操作の失敗
    Error,
}

impl Severity {
    /// 文字列からSeverityに変換（未知の値は `None`）
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Severityを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 監査対象の操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// RBACポリシー置換
    RbacUpdate,
    /// ローカルアカウント作成
    AccountCreate,
    /// ローカルアカウント削除
    AccountDelete,
    /// 通知設定置換
    NotificationUpdate,
    /// 通知サービス作成
    NotificationServiceCreate,
    /// 通知サービス更新
    NotificationServiceUpdate,
    /// 通知サービス削除
    NotificationServiceDelete,
    /// ログイン
    Login,
    /// Application削除
    ApplicationDelete,
    /// Project削除
    ProjectDelete,
}

impl AuditAction {
    /// ドット区切りのアクション名
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RbacUpdate => "rbac.update",
            Self::AccountCreate => "account.create",
            Self::AccountDelete => "account.delete",
            Self::NotificationUpdate => "notification.update",
            Self::NotificationServiceCreate => "notification.service.create",
            Self::NotificationServiceUpdate => "notification.service.update",
            Self::NotificationServiceDelete => "notification.service.delete",
            Self::Login => "auth.login",
            Self::ApplicationDelete => "application.delete",
            Self::ProjectDelete => "project.delete",
        }
    }

    /// 成功時の重要度（削除は warning、それ以外は info）
    pub fn success_severity(&self) -> Severity {
        match self {
            Self::AccountDelete
            | Self::NotificationServiceDelete
            | Self::ApplicationDelete
            | Self::ProjectDelete => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 監査イベント（追記後は不変）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// イベントID（ストア内で一意）
    pub id: String,
    /// 発生時刻（RFC 3339）
    pub timestamp: DateTime<Utc>,
    /// 実行ユーザー（ベストエフォート）
    pub user: String,
    /// ドット区切りのアクション名
    pub action: String,
    /// 対象リソース種別
    pub resource_type: String,
    /// 対象リソース名
    pub resource_name: String,
    /// 重要度
    pub severity: Severity,
    /// 変更前後の状態など（`before` / `after`）
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    /// クライアントIP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// User-Agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// 操作が成功したか
    pub success: bool,
}

/// 管理ハンドラーが記録するユーザー名（認証は上流に委ねている）
pub const ADMIN_USER: &str = "admin";

/// ユーザー名が取れなかったときのプレースホルダー
pub const UNKNOWN_USER: &str = "unknown";

impl AuditEvent {
    /// 成功イベントを作る（重要度はアクションから決まる）
    pub fn new(
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            id: new_event_id(),
            timestamp: Utc::now(),
            user: ADMIN_USER.to_string(),
            action: action.as_str().to_string(),
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            severity: action.success_severity(),
            details: Map::new(),
            ip_address: None,
            user_agent: None,
            success: true,
        }
    }

    /// 実行ユーザーを設定
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// 重要度を上書き
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// 変更失敗として記録（severity=error）
    pub fn failed(mut self) -> Self {
        self.success = false;
        self.severity = Severity::Error;
        self
    }

    /// 成否を設定（重要度は変えない）
    pub fn outcome(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// 変更前の状態
    pub fn before(self, value: Value) -> Self {
        self.detail("before", value)
    }

    /// 変更後（意図した）状態
    pub fn after(self, value: Value) -> Self {
        self.detail("after", value)
    }

    /// 任意の詳細項目
    pub fn detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// クライアント情報を設定
    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip.clone();
        self.user_agent = client.user_agent.clone();
        self
    }
}

fn new_event_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("audit-{}-{}", nanos, &suffix[..8])
}

/// 監査ログフィルタ（指定された条件はAND）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    /// ユーザー
    pub user: Option<String>,
    /// アクション
    pub action: Option<String>,
    /// リソース種別
    pub resource_type: Option<String>,
    /// リソース名
    pub resource_name: Option<String>,
    /// 重要度
    pub severity: Option<Severity>,
    /// 成否
    pub success: Option<bool>,
    /// この時刻以降
    pub start: Option<DateTime<Utc>>,
    /// この時刻以前
    pub end: Option<DateTime<Utc>>,
    /// 先頭からスキップする件数
    pub offset: Option<usize>,
    /// 返す最大件数
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// イベントが全条件を満たすか（offset / limit は対象外）
    pub fn matches(&self, event: &AuditEvent) -> bool {
        fn eq(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }

        eq(&self.user, &event.user)
            && eq(&self.action, &event.action)
            && eq(&self.resource_type, &event.resource_type)
            && eq(&self.resource_name, &event.resource_name)
            && self.severity.map_or(true, |s| s == event.severity)
            && self.success.map_or(true, |s| s == event.success)
            && self.start.map_or(true, |t| event.timestamp >= t)
            && self.end.map_or(true, |t| event.timestamp <= t)
    }
}

/// 一覧メタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListMetadata {
    /// フィルタに一致した総件数（offset / limit 適用前）
    pub total_count: usize,
}

/// 監査ログ一覧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventList {
    /// 新しい順のイベント
    pub items: Vec<AuditEvent>,
    /// メタデータ
    pub metadata: AuditListMetadata,
}

impl AuditEventList {
    /// 空の一覧
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            metadata: AuditListMetadata { total_count: 0 },
        }
    }
}
