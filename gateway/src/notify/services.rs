//! 通知サービス定義
//!
//! `argocd-notifications-cm` の `service.<provider>.<name>` に置くYAMLと、
//! `argocd-notifications-secret` に置く秘匿値を組み立てる。

use crate::common::error::{CommonError, GatewayError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 通知設定ConfigMap
pub const NOTIFICATIONS_CONFIGMAP: &str = "argocd-notifications-cm";
/// 通知の秘匿値を持つSecret
pub const NOTIFICATIONS_SECRET: &str = "argocd-notifications-secret";

/// 通知サービスの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceProvider {
    /// Slack Incoming Webhook
    Slack,
    /// 汎用Webhook
    Webhook,
    /// SMTPメール
    Email,
}

impl ServiceProvider {
    /// 全種類（削除時の検索順）
    pub const ALL: [ServiceProvider; 3] = [Self::Slack, Self::Webhook, Self::Email];

    /// パスセグメントから変換
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slack" => Some(Self::Slack),
            "webhook" => Some(Self::Webhook),
            "email" => Some(Self::Email),
            _ => None,
        }
    }

    /// 種類名
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Webhook => "webhook",
            Self::Email => "email",
        }
    }

    /// ConfigMapのキー
    pub fn service_key(&self, name: &str) -> String {
        format!("service.{}.{}", self.as_str(), name)
    }

    /// Secretのキー（Webhookは秘匿値を持たない）
    pub fn secret_key(&self, name: &str) -> Option<String> {
        match self {
            Self::Slack => Some(format!("slack-{name}-token")),
            Self::Webhook => None,
            Self::Email => Some(format!("email-{name}-password")),
        }
    }

    /// 重複作成時のメッセージ
    pub fn duplicate_message(&self, name: &str) -> String {
        let label = match self {
            Self::Slack => "A Slack service",
            Self::Webhook => "A webhook service",
            Self::Email => "An email service",
        };
        format!(
            "{label} named '{name}' already exists. \
             Please choose a different name or delete the existing service first."
        )
    }
}

impl std::fmt::Display for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 通知サービスのリクエスト共通インターフェース
pub trait ServiceDefinition {
    /// 種類
    fn provider(&self) -> ServiceProvider;

    /// ボディで指定された名前
    fn name(&self) -> &str;

    /// 必須項目の検証（作成時は名前も必須）
    fn validate(&self, require_name: bool) -> Result<(), GatewayError>;

    /// ConfigMapに置くYAML
    fn render(&self, name: &str) -> Result<String, CommonError>;

    /// Secretに置く値
    fn secret_value(&self) -> Option<&str>;

    /// 監査ログ用の要約（秘匿値を含まない）
    fn summary(&self, name: &str) -> Value;
}

fn blank(value: &&str) -> bool {
    value.is_empty()
}

/// Slackサービス
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackServiceRequest {
    /// サービス名
    #[serde(default)]
    pub name: String,
    /// Incoming WebhookのURL
    #[serde(default)]
    pub webhook_url: String,
    /// 送信先チャンネル
    #[serde(default)]
    pub channel: String,
    /// 表示名
    #[serde(default)]
    pub username: String,
    /// アイコン絵文字
    #[serde(default)]
    pub icon: String,
}

#[derive(Serialize)]
struct SlackYaml<'a> {
    token: String,
    #[serde(skip_serializing_if = "blank")]
    username: &'a str,
    #[serde(skip_serializing_if = "blank")]
    icon: &'a str,
    #[serde(skip_serializing_if = "blank")]
    channel: &'a str,
}

impl ServiceDefinition for SlackServiceRequest {
    fn provider(&self) -> ServiceProvider {
        ServiceProvider::Slack
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, require_name: bool) -> Result<(), GatewayError> {
        match (require_name, self.name.is_empty(), self.webhook_url.is_empty()) {
            (true, true, _) | (true, _, true) => Err(GatewayError::validation(
                "name and webhookUrl are required",
            )),
            (false, _, true) => Err(GatewayError::validation("webhookUrl is required")),
            _ => Ok(()),
        }
    }

    fn render(&self, name: &str) -> Result<String, CommonError> {
        let secret_key = self.provider().secret_key(name).unwrap_or_default();
        Ok(serde_yaml::to_string(&SlackYaml {
            token: format!("${secret_key}"),
            username: &self.username,
            icon: &self.icon,
            channel: &self.channel,
        })?)
    }

    fn secret_value(&self) -> Option<&str> {
        Some(&self.webhook_url)
    }

    fn summary(&self, name: &str) -> Value {
        json!({
            "type": "slack",
            "name": name,
            "channel": self.channel,
            "username": self.username,
        })
    }
}

/// 汎用Webhookサービス
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookServiceRequest {
    /// サービス名
    #[serde(default)]
    pub name: String,
    /// 送信先URL
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize)]
struct WebhookYaml<'a> {
    url: &'a str,
}

impl ServiceDefinition for WebhookServiceRequest {
    fn provider(&self) -> ServiceProvider {
        ServiceProvider::Webhook
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, require_name: bool) -> Result<(), GatewayError> {
        if require_name && (self.name.is_empty() || self.url.is_empty()) {
            return Err(GatewayError::validation("name and url are required"));
        }
        if self.url.is_empty() {
            return Err(GatewayError::validation("url is required"));
        }
        Ok(())
    }

    fn render(&self, _name: &str) -> Result<String, CommonError> {
        Ok(serde_yaml::to_string(&WebhookYaml { url: &self.url })?)
    }

    fn secret_value(&self) -> Option<&str> {
        None
    }

    fn summary(&self, name: &str) -> Value {
        json!({
            "type": "webhook",
            "name": name,
            "url": self.url,
        })
    }
}

/// メール（SMTP）サービス
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailServiceRequest {
    /// サービス名
    #[serde(default)]
    pub name: String,
    /// SMTPホスト
    #[serde(default)]
    pub smtp_host: String,
    /// SMTPポート（文字列で受け取る）
    #[serde(default)]
    pub smtp_port: String,
    /// 認証ユーザー
    #[serde(default)]
    pub username: String,
    /// 認証パスワード（Secretにのみ保存）
    #[serde(default)]
    pub password: String,
    /// 送信元アドレス
    #[serde(default)]
    pub from: String,
    /// 既定の宛先
    #[serde(default)]
    pub to: String,
}

impl EmailServiceRequest {
    /// ポート番号を解釈する
    pub fn port(&self) -> Result<u16, GatewayError> {
        self.smtp_port.trim().parse().map_err(|_| {
            GatewayError::validation(format!("smtpPort '{}' is not a valid port", self.smtp_port))
        })
    }

    fn missing_connection_fields(&self) -> bool {
        [
            &self.smtp_host,
            &self.smtp_port,
            &self.username,
            &self.password,
            &self.from,
        ]
        .iter()
        .any(|v| v.is_empty())
    }

    /// 接続テストに必要な項目の検証
    pub fn validate_connection(&self) -> Result<(), GatewayError> {
        if self.missing_connection_fields() {
            return Err(GatewayError::validation(
                "smtpHost, smtpPort, username, password, and from are required",
            ));
        }
        self.port().map(|_| ())
    }
}

#[derive(Serialize)]
struct EmailYaml<'a> {
    host: &'a str,
    port: u16,
    username: &'a str,
    password: String,
    from: &'a str,
    #[serde(skip_serializing_if = "blank")]
    to: &'a str,
}

impl ServiceDefinition for EmailServiceRequest {
    fn provider(&self) -> ServiceProvider {
        ServiceProvider::Email
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, require_name: bool) -> Result<(), GatewayError> {
        if require_name && (self.name.is_empty() || self.missing_connection_fields()) {
            return Err(GatewayError::validation(
                "name, smtpHost, smtpPort, username, password, and from are required",
            ));
        }
        self.validate_connection()
    }

    fn render(&self, name: &str) -> Result<String, CommonError> {
        let secret_key = self.provider().secret_key(name).unwrap_or_default();
        let port = self
            .port()
            .map_err(|e| CommonError::Validation(e.to_string()))?;
        Ok(serde_yaml::to_string(&EmailYaml {
            host: &self.smtp_host,
            port,
            username: &self.username,
            password: format!("${secret_key}"),
            from: &self.from,
            to: &self.to,
        })?)
    }

    fn secret_value(&self) -> Option<&str> {
        Some(&self.password)
    }

    fn summary(&self, name: &str) -> Value {
        json!({
            "type": "email",
            "name": name,
            "smtpHost": self.smtp_host,
            "smtpPort": self.smtp_port,
            "username": self.username,
            "from": self.from,
            "to": self.to,
        })
    }
}
