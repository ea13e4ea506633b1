//! 上流ArgoCDへの転送（透過・キャプチャ）の Integration Tests

use std::time::Duration;

use argocd_gateway::audit::Severity;
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::gateway::{spawn_gateway, spawn_gateway_with};
use crate::support::http::{spawn_chunked_upstream, unused_local_url};

#[tokio::test]
async fn login_success_is_audited_with_username() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/session"))
        .and(body_json(json!({"username": "alice", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "jwt-token"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;
    let response = gw
        .client
        .post(gw.url("/api/v1/session"))
        .header("user-agent", "argocd-ui/1.0")
        .json(&json!({"username": "alice", "password": "secret"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token"], "jwt-token");

    let events = gw.audit_events().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.action, "auth.login");
    assert_eq!(event.user, "alice");
    assert!(event.success);
    assert_eq!(event.severity, Severity::Info);
    assert_eq!(event.user_agent.as_deref(), Some("argocd-ui/1.0"));
    assert_eq!(event.ip_address.as_deref(), Some("127.0.0.1"));
    assert_eq!(event.details["after"]["statusCode"], 200);
    assert_eq!(event.details["after"]["username"], "alice");
}

#[tokio::test]
async fn rejected_login_is_audited_as_failure() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/session"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "invalid credentials"})),
        )
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;
    let response = gw
        .client
        .post(gw.url("/api/v1/session"))
        .json(&json!({"username": "mallory", "password": "guess"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid credentials");

    let events = gw.audit_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user, "mallory");
    assert!(!events[0].success);
    assert_eq!(events[0].severity, Severity::Warning);
}

#[tokio::test]
async fn login_with_unreadable_body_records_unknown_user() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/session"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;
    let response = gw
        .client
        .post(gw.url("/api/v1/session"))
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let events = gw.audit_events().await;
    assert_eq!(events[0].user, "unknown");
    assert!(!events[0].success);
}

#[tokio::test]
async fn application_delete_success_and_failure_are_audited() {
    let upstream = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/applications/guestbook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&upstream)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/projects/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;

    let response = gw
        .client
        .delete(gw.url("/api/v1/applications/guestbook?cascade=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = gw
        .client
        .delete(gw.url("/api/v1/projects/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let events = gw.audit_events().await;
    assert_eq!(events.len(), 2);

    let project = &events[0];
    assert_eq!(project.action, "project.delete");
    assert_eq!(project.resource_name, "missing");
    assert!(!project.success);
    assert_eq!(project.severity, Severity::Error);
    assert_eq!(project.details["statusCode"], 404);

    let application = &events[1];
    assert_eq!(application.action, "application.delete");
    assert_eq!(application.resource_type, "application");
    assert_eq!(application.resource_name, "guestbook");
    assert!(application.success);
    assert_eq!(application.severity, Severity::Warning);
    assert_eq!(application.details["before"]["name"], "guestbook");
}

#[tokio::test]
async fn capturing_and_transparent_modes_return_identical_responses() {
    let upstream = MockServer::start().await;
    let template = ResponseTemplate::new(200)
        .append_header("set-cookie", "argocd.token=abc; Path=/")
        .append_header("set-cookie", "argocd.session=1; Path=/")
        .insert_header("x-argocd-trace", "t-1")
        .set_body_raw(b"{\"metadata\":{\"name\":\"guestbook\"}}".to_vec(), "application/json");
    Mock::given(path("/api/v1/applications/guestbook"))
        .respond_with(template)
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;
    let captured = gw
        .client
        .delete(gw.url("/api/v1/applications/guestbook"))
        .send()
        .await
        .unwrap();
    let transparent = gw
        .client
        .get(gw.url("/api/v1/applications/guestbook"))
        .send()
        .await
        .unwrap();

    assert_eq!(captured.status(), transparent.status());
    for name in ["set-cookie", "x-argocd-trace", "content-type"] {
        let a: Vec<_> = captured.headers().get_all(name).iter().collect();
        let b: Vec<_> = transparent.headers().get_all(name).iter().collect();
        assert_eq!(a, b, "header {name} differs");
    }
    assert_eq!(captured.headers().get_all("set-cookie").iter().count(), 2);

    let a = captured.bytes().await.unwrap();
    let b = transparent.bytes().await.unwrap();
    assert_eq!(a, b);

    // 透過モードは監査しない
    assert_eq!(gw.audit_events().await.len(), 1);
}

#[tokio::test]
async fn transparent_forward_keeps_query_and_adds_forwarded_for() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications"))
        .and(query_param("project", "default"))
        .and(header_exists("x-forwarded-for"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;
    let response = gw
        .client
        .get(gw.url("/api/v1/applications?project=default"))
        .bearer_auth("token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn nested_delete_path_is_audited_with_sub_path() {
    let upstream = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/applications/guestbook/resource"))
        .and(query_param("kind", "Deployment"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let gw = spawn_gateway(&upstream.uri()).await;
    let response = gw
        .client
        .delete(gw.url("/api/v1/applications/guestbook/resource?kind=Deployment"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let events = gw.audit_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "application.delete");
    assert_eq!(events[0].resource_name, "guestbook/resource");
    assert!(events[0].success);
}

#[tokio::test]
async fn transparent_stream_outlives_upstream_deadline() {
    let chunks = vec![
        "data: 1\n\n",
        "data: 2\n\n",
        "data: 3\n\n",
        "data: 4\n\n",
        "data: 5\n\n",
        "data: 6\n\n",
    ];
    let upstream = spawn_chunked_upstream(
        "text/event-stream",
        chunks.clone(),
        Duration::from_millis(300),
    )
    .await;

    let gw = spawn_gateway_with(&upstream, |config| {
        config.upstream_timeout = Duration::from_millis(700);
    })
    .await;
    let response = gw
        .client
        .get(gw.url("/api/v1/stream/applications"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = response.text().await.unwrap();
    assert_eq!(body, chunks.concat());
    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn transparent_forward_times_out_waiting_for_headers() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/applications"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&upstream)
        .await;

    let gw = spawn_gateway_with(&upstream.uri(), |config| {
        config.upstream_timeout = Duration::from_millis(200);
    })
    .await;
    let response = gw
        .client
        .get(gw.url("/api/v1/applications"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn chunked_upstream_body_is_chunked_in_both_modes() {
    let chunks = vec!["{\"metadata\":", "{\"name\":\"guestbook\"}}"];
    let upstream =
        spawn_chunked_upstream("application/json", chunks.clone(), Duration::from_millis(10))
            .await;

    let gw = spawn_gateway(&upstream).await;
    let captured = gw
        .client
        .delete(gw.url("/api/v1/applications/guestbook"))
        .send()
        .await
        .unwrap();
    let transparent = gw
        .client
        .get(gw.url("/api/v1/applications/guestbook"))
        .send()
        .await
        .unwrap();

    assert_eq!(captured.status(), transparent.status());
    assert!(captured.headers().get("content-length").is_none());
    assert!(transparent.headers().get("content-length").is_none());
    assert_eq!(
        captured.headers().get("content-type"),
        transparent.headers().get("content-type")
    );

    let a = captured.text().await.unwrap();
    let b = transparent.text().await.unwrap();
    assert_eq!(a, chunks.concat());
    assert_eq!(a, b);
}

#[tokio::test]
async fn unreachable_upstream_returns_502_without_audit() {
    let gw = spawn_gateway(&unused_local_url().await).await;

    let response = gw
        .client
        .post(gw.url("/api/v1/session"))
        .json(&json!({"username": "alice", "password": "secret"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = gw
        .client
        .get(gw.url("/api/v1/applications"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert!(gw.audit_events().await.is_empty());
}

#[tokio::test]
async fn slow_upstream_times_out_without_audit() {
    let upstream = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/projects/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&upstream)
        .await;

    let gw = spawn_gateway_with(&upstream.uri(), |config| {
        config.upstream_timeout = Duration::from_millis(200);
    })
    .await;
    let response = gw
        .client
        .delete(gw.url("/api/v1/projects/slow"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(gw.audit_events().await.is_empty());
}
