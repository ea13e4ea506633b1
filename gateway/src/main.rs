//! ArgoCD Gateway Entry Point

use argocd_gateway::cli::{serve::ServeArgs, Cli, Commands};
use argocd_gateway::config::{
    get_env_with_fallback_or, get_env_with_fallback_parse, GatewayConfig, StoreBackend,
};
use argocd_gateway::store::{ConfigStore, InMemoryConfigStore, KubeConfigStore};
use argocd_gateway::{logging, server, AppState};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        let host = get_env_with_fallback_or("GATEWAY_HOST", "HOST", "0.0.0.0");
        let port = get_env_with_fallback_parse("GATEWAY_PORT", "PORT", 8081);
        Self { host, port }
    }

    fn from_args(host: String, port: u16) -> Self {
        Self { host, port }
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn apply_overrides(config: &mut GatewayConfig, args: &ServeArgs) {
    if let Some(upstream) = &args.upstream {
        config.upstream_url = upstream.clone();
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(store) = args.store {
        config.store_backend = store;
    }
}

async fn build_store(config: &GatewayConfig) -> Result<Arc<dyn ConfigStore>, String> {
    match config.store_backend {
        StoreBackend::Kube => {
            let store = KubeConfigStore::connect(&config.namespace, config.store_timeout)
                .await
                .map_err(|e| e.to_string())?;
            info!(namespace = %config.namespace, "using Kubernetes config store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("using in-memory config store; changes are lost on restart");
            Ok(Arc::new(InMemoryConfigStore::new()))
        }
    }
}

async fn run_server(server_config: ServerConfig, config: GatewayConfig) -> Result<(), String> {
    let store = build_store(&config).await?;
    let state = AppState::new(config, store).map_err(|e| e.to_string())?;
    server::run(state, &server_config.bind_addr(), server::shutdown_signal())
        .await
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init() {
        eprintln!("Error: failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let mut config = GatewayConfig::from_env();
    let server_config = match cli.command {
        Some(Commands::Serve(args)) => {
            apply_overrides(&mut config, &args);
            ServerConfig::from_args(args.host, args.port)
        }
        None => ServerConfig::from_env(),
    };

    if let Err(e) = run_server(server_config, config).await {
        error!("Gateway failed: {}", e);
        std::process::exit(1);
    }
}
