//! REST APIハンドラー
//!
//! ルーティング方針:
//! - 管理系（RBAC・アカウント・通知・監査ログ）はゲートウェイ内で処理する
//! - ログインとApplication / Project削除はキャプチャモードで転送し監査する
//! - それ以外の `/api/*` は上流ArgoCDへ透過転送する
//! - `/api/*` 以外は静的ファイル（設定時）または404

pub mod accounts;
pub mod audit_log;
pub mod deletes;
pub mod error;
pub mod notifications;
pub mod proxy;
pub mod rbac;
pub mod session;

use crate::audit::types::AuditEvent;
use crate::common::error::GatewayError;
use crate::common::ip::ClientInfo;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use error::AppError;
use tower::ServiceExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// 変更操作の結果に応じて監査イベントを記録し、結果をそのまま返す
///
/// 失敗時は同じイベントを `success=false`・`severity=error` で記録する。
pub(crate) async fn record_outcome<T>(
    state: &AppState,
    event: AuditEvent,
    result: Result<T, GatewayError>,
) -> Result<T, GatewayError> {
    match &result {
        Ok(_) => state.audit.record(event).await,
        Err(err) => {
            tracing::warn!(action = %event.action, resource = %event.resource_name, error = %err, "mutation failed");
            state.audit.record(event.failed()).await;
        }
    }
    result
}

/// アプリケーションルーターを作成
pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        // キャプチャモード転送
        .route(
            "/api/v1/session",
            post(session::login).fallback(proxy::forward),
        )
        .route(
            "/api/v1/applications/*name",
            axum::routing::delete(deletes::delete_application).fallback(proxy::forward),
        )
        .route(
            "/api/v1/projects/*name",
            axum::routing::delete(deletes::delete_project).fallback(proxy::forward),
        )
        // RBAC
        .route(
            "/api/v1/settings/rbac",
            get(rbac::get_rbac).put(rbac::update_rbac),
        )
        // ローカルアカウント
        .route(
            "/api/v1/settings/accounts",
            get(accounts::list_accounts)
                .post(accounts::create_account)
                .delete(accounts::delete_account),
        )
        .route(
            "/api/v1/account",
            get(accounts::list_accounts)
                .post(accounts::create_account)
                .delete(accounts::delete_account),
        )
        // 通知
        .route(
            "/api/v1/notifications/config",
            get(notifications::get_config).put(notifications::update_config),
        )
        .route("/api/v1/notifications/services", any(missing_service_name))
        .route(
            "/api/v1/notifications/services/*rest",
            any(notifications::services),
        )
        // 監査ログ
        .route("/api/v1/settings/audit", get(audit_log::list_events));

    Router::new()
        .route("/health", get(health))
        .merge(api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

async fn missing_service_name() -> AppError {
    AppError(GatewayError::validation("Service name is required"))
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// ルートに一致しなかったリクエスト
async fn fallback(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Request,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    if is_api_path(&path) {
        return proxy::forward(State(state), client, request).await;
    }

    match &state.config.static_dir {
        Some(dir) => match ServeDir::new(dir).oneshot(request).await {
            Ok(response) => Ok(response.into_response()),
            Err(never) => match never {},
        },
        None => Err(GatewayError::NotFound(format!("no route for {path}")).into()),
    }
}

/// 全レスポンスにCORSヘッダーを付け、プリフライトは204で返す
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    response
}
