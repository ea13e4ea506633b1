//! serve サブコマンド
//!
//! ゲートウェイサーバーを起動します。

use crate::config::StoreBackend;
use clap::Args;

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, default_value = "8081", env = "GATEWAY_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "GATEWAY_HOST")]
    pub host: String,

    /// ArgoCD API server origin (overrides GATEWAY_UPSTREAM_URL)
    #[arg(long)]
    pub upstream: Option<String>,

    /// Namespace of the ArgoCD ConfigMaps / Secrets (overrides GATEWAY_NAMESPACE)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Config store backend (overrides GATEWAY_STORE)
    #[arg(long, value_enum)]
    pub store: Option<StoreBackend>,
}
