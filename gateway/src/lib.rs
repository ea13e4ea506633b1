//! ArgoCD Gateway
//!
//! ArgoCD APIサーバーの前段に立ち、管理系API（RBAC・ローカルアカウント・通知）を
//! ゲートウェイ内で処理して監査ログに記録しつつ、それ以外の `/api/*` を上流へ転送する。

#![warn(missing_docs)]

/// 共通型定義（エラー・クライアント情報）
pub mod common;

/// REST APIハンドラー
pub mod api;

/// 監査ログ
pub mod audit;

/// ConfigMap / Secret ストア
pub mod store;

/// 通知サービス定義と疎通テスト
pub mod notify;

/// 設定管理
pub mod config;

/// ロギング初期化
pub mod logging;

/// CLI
pub mod cli;

/// サーバー起動
pub mod server;

use api::proxy::UpstreamProxy;
use audit::AuditLogStore;
use common::error::GatewayError;
use config::GatewayConfig;
use notify::Notifier;
use std::sync::Arc;
use store::ConfigStore;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// 実行時設定
    pub config: Arc<GatewayConfig>,
    /// ConfigMap / Secret ストア
    pub store: Arc<dyn ConfigStore>,
    /// 監査ログストア
    pub audit: AuditLogStore,
    /// 上流ArgoCDへの転送クライアント
    pub proxy: UpstreamProxy,
    /// 通知テスト送信クライアント
    pub notifier: Notifier,
}

impl AppState {
    /// 設定とストアから状態を組み立てる
    pub fn new(config: GatewayConfig, store: Arc<dyn ConfigStore>) -> Result<Self, GatewayError> {
        let proxy = UpstreamProxy::new(&config.upstream_url, config.upstream_timeout)?;
        let notifier = Notifier::new(config.notify_timeout)?;
        let audit = AuditLogStore::new(store.clone(), config.audit.clone());
        Ok(Self {
            config: Arc::new(config),
            store,
            audit,
            proxy,
            notifier,
        })
    }
}
