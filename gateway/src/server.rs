//! axumサーバー起動・シャットダウンハンドリング

use crate::common::error::{CommonError, GatewayError};
use crate::AppState;
use std::future::Future;
use std::net::SocketAddr;
use tracing::{info, warn};

/// axumサーバーを起動し、`shutdown` が完了するまで待機する
pub async fn run<F>(state: AppState, bind_addr: &str, shutdown: F) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let upstream = state.proxy.base_url().to_string();
    let app = crate::api::create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| {
            GatewayError::Common(CommonError::Config(format!(
                "failed to bind to {bind_addr}: {e}"
            )))
        })?;

    info!(%upstream, "ArgoCD gateway listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| GatewayError::Internal(format!("server error: {e}")))?;

    info!("Server shutdown complete");
    Ok(())
}

/// Ctrl+C / SIGTERM を待機
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
