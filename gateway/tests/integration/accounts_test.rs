//! ローカルアカウントAPIの Integration Tests

use argocd_gateway::audit::Severity;
use argocd_gateway::store::DocumentKind;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::support::gateway::spawn_gateway;
use crate::support::http::unused_local_url;

#[tokio::test]
async fn create_list_and_delete_account() {
    let gw = spawn_gateway(&unused_local_url().await).await;
    gw.store
        .seed(
            DocumentKind::ConfigMap,
            "argocd-cm",
            &[("url", "https://argocd.example.com")],
        )
        .await;

    let response = gw
        .client
        .post(gw.url("/api/v1/settings/accounts"))
        .json(&json!({"name": "ci-bot", "password": "s3cret!", "enabled": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "ci-bot");
    assert_eq!(body["message"], "Account created successfully");

    assert_eq!(
        gw.value(DocumentKind::ConfigMap, "argocd-cm", "accounts.ci-bot")
            .await
            .as_deref(),
        Some("apiKey,login")
    );
    assert_eq!(
        gw.value(DocumentKind::ConfigMap, "argocd-cm", "url")
            .await
            .as_deref(),
        Some("https://argocd.example.com")
    );
    let hash = gw
        .value(DocumentKind::Secret, "argocd-secret", "accounts.ci-bot.password")
        .await
        .unwrap();
    assert!(bcrypt::verify("s3cret!", &hash).unwrap());

    let list: Value = gw
        .client
        .get(gw.url("/api/v1/account"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = list["items"].as_array().unwrap();
    assert_eq!(items[0]["name"], "admin");
    assert_eq!(items[1]["name"], "ci-bot");
    assert_eq!(items[1]["enabled"], true);
    assert_eq!(items[1]["capabilities"], json!(["apiKey", "login"]));

    let response = gw
        .client
        .delete(gw.url("/api/v1/settings/accounts?name=ci-bot"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(gw
        .value(DocumentKind::ConfigMap, "argocd-cm", "accounts.ci-bot")
        .await
        .is_none());
    assert!(gw
        .value(DocumentKind::Secret, "argocd-secret", "accounts.ci-bot.password")
        .await
        .is_none());

    let events = gw.audit_events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "account.delete");
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].details["before"]["name"], "ci-bot");
    assert_eq!(events[1].action, "account.create");
    assert_eq!(events[1].severity, Severity::Info);
    assert_eq!(events[1].user, "admin");
    assert!(!serde_json::to_string(&events[1].details)
        .unwrap()
        .contains("s3cret!"));
}

#[tokio::test]
async fn deleting_admin_is_forbidden_without_side_effects() {
    let gw = spawn_gateway(&unused_local_url().await).await;
    gw.store
        .seed(
            DocumentKind::ConfigMap,
            "argocd-cm",
            &[("accounts.admin.enabled", "true")],
        )
        .await;
    let writes_before = gw.store.write_count();

    let response = gw
        .client
        .delete(gw.url("/api/v1/settings/accounts?name=admin"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Cannot delete admin account");
    assert_eq!(gw.store.write_count(), writes_before);
    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn duplicate_and_invalid_accounts_are_rejected() {
    let gw = spawn_gateway(&unused_local_url().await).await;
    gw.store
        .seed(
            DocumentKind::ConfigMap,
            "argocd-cm",
            &[("accounts.ci-bot", "apiKey")],
        )
        .await;

    let response = gw
        .client
        .post(gw.url("/api/v1/settings/accounts"))
        .json(&json!({"name": "ci-bot", "password": "x", "enabled": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = gw
        .client
        .post(gw.url("/api/v1/settings/accounts"))
        .json(&json!({"name": "-bad-", "password": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = gw
        .client
        .post(gw.url("/api/v1/settings/accounts"))
        .json(&json!({"name": "deployer", "password": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Password is required");

    let response = gw
        .client
        .delete(gw.url("/api/v1/settings/accounts?name=ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = gw
        .client
        .delete(gw.url("/api/v1/settings/accounts"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn failed_write_is_audited_as_error() {
    let gw = spawn_gateway(&unused_local_url().await).await;
    gw.store.fail_next_writes(1);

    let response = gw
        .client
        .post(gw.url("/api/v1/settings/accounts"))
        .json(&json!({"name": "ci-bot", "password": "s3cret!", "enabled": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let events = gw.audit_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "account.create");
    assert!(!events[0].success);
    assert_eq!(events[0].severity, Severity::Error);
}
