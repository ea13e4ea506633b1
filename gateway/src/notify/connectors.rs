//! 通知サービスの疎通テスト
//!
//! 保存済みの設定ではなくリクエストボディの設定で送信する。

use super::services::{EmailServiceRequest, SlackServiceRequest};
use crate::common::error::GatewayError;
use lettre::{
    message::header::ContentType,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const SLACK_TEST_TEXT: &str = "🧪 Test notification from Argo CD";
const WEBHOOK_TEST_MESSAGE: &str = "This is a test webhook from Argo CD";
const EMAIL_TEST_SUBJECT: &str = "Test Email from Argo CD";
const EMAIL_TEST_BODY: &str = "This is a test email to verify your SMTP configuration.\n\n\
If you received this, your email notifications are configured correctly!\n";

/// 疎通テストの結果メッセージ
pub type TestOutcome = Result<String, GatewayError>;

/// 通知テスト送信クライアント
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl Notifier {
    /// 送信期限を指定して作る
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::StatusCode, GatewayError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "notification test delivery failed");
                if e.is_timeout() {
                    GatewayError::Timeout(format!("notification endpoint timed out: {e}"))
                } else {
                    GatewayError::Upstream(format!("failed to send test notification: {e}"))
                }
            })?;
        Ok(response.status())
    }

    /// Slackにテストメッセージを送る（200以外は失敗）
    pub async fn test_slack(&self, request: &SlackServiceRequest) -> TestOutcome {
        if request.webhook_url.is_empty() {
            return Err(GatewayError::validation("webhookUrl is required"));
        }

        let mut payload = json!({ "text": SLACK_TEST_TEXT });
        if !request.username.is_empty() {
            payload["username"] = json!(request.username);
        }
        if !request.icon.is_empty() {
            payload["icon_emoji"] = json!(request.icon);
        }
        if !request.channel.is_empty() {
            payload["channel"] = json!(request.channel);
        }

        let status = self.post_json(&request.webhook_url, &payload).await?;
        if status != reqwest::StatusCode::OK {
            return Err(GatewayError::Upstream(format!(
                "Slack returned error: {status}"
            )));
        }
        info!("slack test notification sent");
        Ok("Test notification sent".to_string())
    }

    /// Webhookにサンプルペイロードを送る（2xx以外は失敗）
    pub async fn test_webhook(&self, url: &str) -> TestOutcome {
        if url.is_empty() {
            return Err(GatewayError::validation("url is required"));
        }

        let payload = json!({
            "app": { "name": "test-app", "namespace": "default" },
            "status": { "health": "Healthy", "sync": "Synced" },
            "revision": "abc123def456",
            "message": WEBHOOK_TEST_MESSAGE,
        });
        let status = self.post_json(url, &payload).await?;
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!(
                "Webhook endpoint returned error: {status}"
            )));
        }
        info!(%status, "webhook test payload sent");
        Ok(format!("Test webhook sent successfully ({status})"))
    }

    /// SMTPに接続して認証し、宛先があればテストメールを送る
    pub async fn test_email(&self, request: &EmailServiceRequest) -> TestOutcome {
        request.validate_connection()?;
        let port = request.port()?;

        let tls = TlsParameters::new(request.smtp_host.clone())
            .map_err(|e| GatewayError::Upstream(format!("invalid TLS parameters: {e}")))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&request.smtp_host)
            .port(port)
            .tls(Tls::Opportunistic(tls))
            .credentials(Credentials::new(
                request.username.clone(),
                request.password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build();

        debug!(host = %request.smtp_host, port, "testing SMTP connection");
        transport.test_connection().await.map_err(map_smtp_error)?;

        if request.to.is_empty() {
            return Ok("SMTP connection and authentication successful".to_string());
        }

        let message = Message::builder()
            .from(request.from.parse().map_err(|e| {
                GatewayError::validation(format!("invalid from address: {e}"))
            })?)
            .to(request
                .to
                .parse()
                .map_err(|e| GatewayError::validation(format!("invalid to address: {e}")))?)
            .subject(EMAIL_TEST_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(EMAIL_TEST_BODY.to_string())
            .map_err(|e| GatewayError::Internal(format!("failed to build test email: {e}")))?;
        transport.send(message).await.map_err(map_smtp_error)?;

        info!(to = %request.to, "test email sent");
        Ok("Test email sent successfully".to_string())
    }
}

/// 認証拒否（5.3.x）は401、それ以外は502
fn map_smtp_error(err: lettre::transport::smtp::Error) -> GatewayError {
    warn!(error = %err, "SMTP test failed");
    let auth_rejected = err
        .status()
        .map(|code| code.to_string().starts_with("53"))
        .unwrap_or(false);
    if auth_rejected {
        GatewayError::Authentication(format!("SMTP authentication failed: {err}"))
    } else if err.is_timeout() {
        GatewayError::Timeout(format!("SMTP server timed out: {err}"))
    } else {
        GatewayError::Upstream(format!("SMTP test failed: {err}"))
    }
}
