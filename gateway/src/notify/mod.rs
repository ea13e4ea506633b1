//! 通知サービス
//!
//! - `services`: ConfigMap / Secret に置くサービス定義
//! - `connectors`: Slack・Webhook・SMTP への疎通テスト

pub mod connectors;
pub mod services;

pub use connectors::Notifier;
pub use services::{
    EmailServiceRequest, ServiceDefinition, ServiceProvider, SlackServiceRequest,
    WebhookServiceRequest, NOTIFICATIONS_CONFIGMAP, NOTIFICATIONS_SECRET,
};
