//! ロギング初期化
//!
//! `GATEWAY_LOG_LEVEL`（旧: `RUST_LOG`）でフィルタ、`GATEWAY_LOG_FORMAT=json` で
//! JSON出力、`GATEWAY_LOG_DIR` 指定時は日次ローテーションのファイルにも書き出す。

use crate::common::error::CommonError;
use crate::config::get_env_with_fallback;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "argocd-gateway.log";

/// 出力フォーマット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人間向けテキスト
    Text,
    /// 構造化JSON（ログ集約向け）
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match get_env_with_fallback("GATEWAY_LOG_FORMAT", "LOG_FORMAT")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

fn env_filter() -> EnvFilter {
    let directive = get_env_with_fallback("GATEWAY_LOG_LEVEL", "RUST_LOG")
        .unwrap_or_else(|| "info".to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// グローバルsubscriberを初期化する
pub fn init() -> Result<(), CommonError> {
    let format = LogFormat::from_env();
    let log_dir = get_env_with_fallback("GATEWAY_LOG_DIR", "LOG_DIR").map(PathBuf::from);

    let result = match format {
        LogFormat::Json => {
            let file_layer = log_dir.map(|dir| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
            });
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().json().flatten_event(true))
                .with(file_layer)
                .try_init()
        }
        LogFormat::Text => {
            let file_layer = log_dir.map(|dir| {
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
            });
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer())
                .with(file_layer)
                .try_init()
        }
    };

    result.map_err(|e| CommonError::Config(format!("failed to initialize logging: {e}")))
}
