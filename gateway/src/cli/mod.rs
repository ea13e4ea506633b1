//! CLI module for argocd-gateway

pub mod serve;

use clap::{Parser, Subcommand};

/// ArgoCD gateway - audited front door for the ArgoCD API server
#[derive(Parser, Debug)]
#[command(name = "argocd-gateway")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    GATEWAY_HOST                  Bind address (default: 0.0.0.0)
    GATEWAY_PORT                  Listen port (default: 8081)
    GATEWAY_UPSTREAM_URL          ArgoCD API server origin (legacy: ARGOCD_SERVER)
    GATEWAY_NAMESPACE             Namespace of ArgoCD ConfigMaps / Secrets (default: argocd)
    GATEWAY_STORE                 Config store backend: kube | memory (default: kube)
    GATEWAY_STATIC_DIR            Dashboard build directory served for non-API paths
    GATEWAY_UPSTREAM_TIMEOUT_SECS Upstream request deadline (default: 60)
    GATEWAY_STORE_TIMEOUT_SECS    Cluster API call deadline (default: 10)
    GATEWAY_AUDIT_CAPACITY        Retained audit events (default: 1000)
    GATEWAY_AUDIT_MAX_ATTEMPTS    Audit append attempts on conflict (default: 5)
    GATEWAY_LOG_LEVEL             Log level (default: info)
    GATEWAY_LOG_FORMAT            text | json (default: text)
    GATEWAY_LOG_DIR               Directory for daily-rolling log files
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway server
    Serve(serve::ServeArgs),
}
