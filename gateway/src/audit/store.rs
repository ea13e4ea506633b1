//! 監査ログストア
//!
//! 新しい順に最大 `capacity` 件のイベントを1つのConfigMap（キー `events`、JSON配列）に保持する。
//! 追記は読み取り→先頭挿入→切り詰め→バージョン付き書き戻しで、競合時は全体をやり直す。

use super::types::{AuditEvent, AuditEventList, AuditFilter, AuditListMetadata};
use crate::common::error::{CommonError, GatewayError, StoreError};
use crate::config::AuditLogConfig;
use crate::store::{ConfigDocument, ConfigStore, DocumentKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// イベント配列を格納するキー
pub const EVENTS_KEY: &str = "events";

/// 監査ログストア
#[derive(Clone)]
pub struct AuditLogStore {
    store: Arc<dyn ConfigStore>,
    config: AuditLogConfig,
}

impl AuditLogStore {
    /// 新しいストアを作る
    pub fn new(store: Arc<dyn ConfigStore>, config: AuditLogConfig) -> Self {
        Self { store, config }
    }

    /// 設定を返す
    pub fn config(&self) -> &AuditLogConfig {
        &self.config
    }

    /// イベントを先頭に追記する
    ///
    /// バージョン競合（または同時作成）の場合は読み取りからやり直し、
    /// `max_attempts` 回で諦めて `GatewayError::Audit` を返す。
    pub async fn append(&self, event: AuditEvent) -> Result<(), GatewayError> {
        let entry = serde_json::to_value(&event).map_err(CommonError::from)?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.try_append(&entry).await {
                Ok(()) => {
                    debug!(id = %event.id, action = %event.action, attempt, "audit event appended");
                    return Ok(());
                }
                Err(err) if err.is_contention() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        id = %event.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "audit log write conflicted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_contention() => {
                    return Err(GatewayError::Audit(format!(
                        "gave up appending {} after {} attempts: {}",
                        event.id, attempt, err
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// 追記を試み、失敗はログに残して握りつぶす
    ///
    /// 管理操作・転送の結果は監査の成否に左右されない。
    pub async fn record(&self, event: AuditEvent) {
        let id = event.id.clone();
        let action = event.action.clone();
        if let Err(err) = self.append(event).await {
            warn!(id = %id, action = %action, error = %err, "audit event dropped");
        }
    }

    /// フィルタに一致するイベントを新しい順に返す
    ///
    /// ログ文書が存在しなければ空の一覧。解釈できないレコードは読み飛ばす。
    pub async fn query(&self, filter: &AuditFilter) -> Result<AuditEventList, GatewayError> {
        let Some(document) = self
            .store
            .get(DocumentKind::ConfigMap, &self.config.document)
            .await?
        else {
            return Ok(AuditEventList::empty());
        };

        let matched: Vec<AuditEvent> = parse_entries(&document)?
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<AuditEvent>(entry) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable audit record");
                    None
                }
            })
            .filter(|event| filter.matches(event))
            .collect();

        let total_count = matched.len();
        let items = matched
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(AuditEventList {
            items,
            metadata: AuditListMetadata { total_count },
        })
    }

    async fn try_append(&self, entry: &Value) -> Result<(), StoreError> {
        let existing = self
            .store
            .get(DocumentKind::ConfigMap, &self.config.document)
            .await?;

        match existing {
            None => {
                let mut document = ConfigDocument::config_map(&self.config.document);
                document
                    .data
                    .insert(EVENTS_KEY.to_string(), encode(&[entry.clone()])?);
                self.store.create(&document).await?;
            }
            Some(mut document) => {
                let mut entries = parse_entries(&document)?;
                entries.insert(0, entry.clone());
                entries.truncate(self.config.capacity.max(1));
                document
                    .data
                    .insert(EVENTS_KEY.to_string(), encode(&entries)?);
                self.store.update(&document).await?;
            }
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        use rand::RngExt;

        let base = self.config.retry_base.as_millis() as u64;
        let cap = self.config.retry_max.as_millis().max(1) as u64;
        let exp = base.saturating_mul(1u64 << attempt.saturating_sub(1).min(16)).min(cap);
        let jitter = if exp > 1 {
            rand::rng().random_range(0..=exp / 2)
        } else {
            0
        };
        Duration::from_millis(exp / 2 + jitter)
    }
}

fn encode(entries: &[Value]) -> Result<String, StoreError> {
    serde_json::to_string(entries).map_err(|e| StoreError::Invalid(e.to_string()))
}

/// 文書からイベント配列を取り出す（キーなし・空文字は空配列）
///
/// 配列として読めない場合は上書きせずエラーにする。
fn parse_entries(document: &ConfigDocument) -> Result<Vec<Value>, StoreError> {
    match document.get(EVENTS_KEY).map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => serde_json::from_str::<Vec<Value>>(raw).map_err(|e| {
            StoreError::Invalid(format!(
                "{} key '{}' is not a JSON array: {}",
                document.describe(),
                EVENTS_KEY,
                e
            ))
        }),
    }
}
