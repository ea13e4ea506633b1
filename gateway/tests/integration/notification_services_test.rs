//! 通知サービスAPIの Integration Tests

use argocd_gateway::audit::Severity;
use argocd_gateway::store::DocumentKind;
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::gateway::spawn_gateway;
use crate::support::http::unused_local_url;

const CM: &str = "argocd-notifications-cm";
const SECRET: &str = "argocd-notifications-secret";

#[tokio::test]
async fn slack_service_lifecycle() {
    let gw = spawn_gateway(&unused_local_url().await).await;

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/slack"))
        .json(&json!({
            "name": "team-alerts",
            "webhookUrl": "https://hooks.slack.com/services/T000/B000/XXX",
            "channel": "#deploys",
            "username": "argocd"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "created", "name": "team-alerts"}));

    let rendered = gw
        .value(DocumentKind::ConfigMap, CM, "service.slack.team-alerts")
        .await
        .unwrap();
    assert!(rendered.contains("$slack-team-alerts-token"));
    assert!(rendered.contains("#deploys"));
    assert!(!rendered.contains("hooks.slack.com"));
    assert_eq!(
        gw.value(DocumentKind::Secret, SECRET, "slack-team-alerts-token")
            .await
            .as_deref(),
        Some("https://hooks.slack.com/services/T000/B000/XXX")
    );

    let response = gw
        .client
        .put(gw.url("/api/v1/notifications/services/slack/team-alerts"))
        .json(&json!({
            "webhookUrl": "https://hooks.slack.com/services/T000/B000/YYY",
            "channel": "#ops"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "updated");
    assert!(gw
        .value(DocumentKind::ConfigMap, CM, "service.slack.team-alerts")
        .await
        .unwrap()
        .contains("#ops"));
    assert_eq!(
        gw.value(DocumentKind::Secret, SECRET, "slack-team-alerts-token")
            .await
            .as_deref(),
        Some("https://hooks.slack.com/services/T000/B000/YYY")
    );

    let response = gw
        .client
        .delete(gw.url("/api/v1/notifications/services/team-alerts"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "deleted", "name": "team-alerts"}));
    assert!(gw
        .value(DocumentKind::ConfigMap, CM, "service.slack.team-alerts")
        .await
        .is_none());
    assert!(gw
        .value(DocumentKind::Secret, SECRET, "slack-team-alerts-token")
        .await
        .is_none());

    let events = gw.audit_events().await;
    let actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "notification.service.delete",
            "notification.service.update",
            "notification.service.create",
        ]
    );
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].resource_name, "slack/team-alerts");
    assert_eq!(events[0].details["before"]["type"], "slack");
    assert!(events.iter().all(|e| e.success));
    let serialized = serde_json::to_string(&events).unwrap();
    assert!(!serialized.contains("hooks.slack.com"));
}

#[tokio::test]
async fn duplicate_service_is_conflict() {
    let gw = spawn_gateway(&unused_local_url().await).await;
    let payload = json!({"name": "ci", "url": "https://ci.example.com/hook"});

    let first = gw
        .client
        .post(gw.url("/api/v1/notifications/services/webhook"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = gw
        .client
        .post(gw.url("/api/v1/notifications/services/webhook"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "Service already exists");
    assert!(body["message"].as_str().unwrap().contains("ci"));

    // 重複は監査しない
    assert_eq!(gw.audit_events().await.len(), 1);
}

#[tokio::test]
async fn email_service_keeps_password_in_secret() {
    let gw = spawn_gateway(&unused_local_url().await).await;

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/email"))
        .json(&json!({
            "name": "ops-mail",
            "smtpHost": "smtp.example.com",
            "smtpPort": "587",
            "username": "bot@example.com",
            "password": "mail-pass",
            "from": "argocd@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let rendered = gw
        .value(DocumentKind::ConfigMap, CM, "service.email.ops-mail")
        .await
        .unwrap();
    assert!(rendered.contains("port: 587"));
    assert!(rendered.contains("$email-ops-mail-password"));
    assert!(!rendered.contains("mail-pass"));
    assert_eq!(
        gw.value(DocumentKind::Secret, SECRET, "email-ops-mail-password")
            .await
            .as_deref(),
        Some("mail-pass")
    );

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/email"))
        .json(&json!({
            "name": "bad-port",
            "smtpHost": "smtp.example.com",
            "smtpPort": "not-a-port",
            "username": "u",
            "password": "p",
            "from": "argocd@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_and_malformed_service_requests() {
    let gw = spawn_gateway(&unused_local_url().await).await;

    let response = gw
        .client
        .put(gw.url("/api/v1/notifications/services/webhook/ghost"))
        .json(&json!({"url": "https://example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = gw
        .client
        .delete(gw.url("/api/v1/notifications/services/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/webhook"))
        .json(&json!({"name": "no-url"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/webhook"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/pagerduty"))
        .json(&json!({"name": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = gw
        .client
        .get(gw.url("/api/v1/notifications/services/a/b/c/d"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn slack_test_reports_receiver_status() {
    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .and(body_partial_json(json!({"channel": "#deploys"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&receiver)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&receiver)
        .await;

    let gw = spawn_gateway(&unused_local_url().await).await;

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/slack/test"))
        .json(&json!({
            "webhookUrl": format!("{}/ok", receiver.uri()),
            "channel": "#deploys"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/slack/test"))
        .json(&json!({"webhookUrl": format!("{}/broken", receiver.uri())}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // 疎通テストは監査対象外
    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn webhook_test_accepts_any_2xx() {
    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accepted"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&receiver)
        .await;
    Mock::given(method("POST"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&receiver)
        .await;

    let gw = spawn_gateway(&unused_local_url().await).await;

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/webhook/test/webhook"))
        .json(&json!({"url": format!("{}/accepted", receiver.uri())}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("202"));

    let response = gw
        .client
        .post(gw.url("/api/v1/notifications/services/webhook/test/webhook"))
        .json(&json!({"url": format!("{}/missing", receiver.uri())}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
