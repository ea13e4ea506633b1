//! プロセス内設定ストア
//!
//! クラスタなしの開発起動とテストで使う。各呼び出しは一度スケジューラに制御を返すため、
//! 並行する読み取り→書き込みの競合がシングルスレッドランタイムでも再現する。

use super::traits::{ConfigDocument, ConfigStore, DocumentKind};
use crate::common::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// プロセス内設定ストア
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    documents: RwLock<HashMap<(DocumentKind, String), ConfigDocument>>,
    next_version: AtomicU64,
    writes: AtomicUsize,
    fail_writes: AtomicUsize,
}

impl InMemoryConfigStore {
    /// 空のストアを作る
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期データを投入する（バージョンは採番し直す）
    pub async fn seed(&self, kind: DocumentKind, name: &str, data: &[(&str, &str)]) {
        let mut document = ConfigDocument::new(kind, name);
        for (key, value) in data {
            document.data.insert((*key).to_string(), (*value).to_string());
        }
        document.version = Some(self.bump_version());
        self.documents
            .write()
            .await
            .insert((kind, name.to_string()), document);
    }

    /// 成功した create / update の累計回数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 次の `count` 回の書き込みを `Unavailable` で失敗させる
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    fn bump_version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn take_injected_failure(&self, document: &ConfigDocument) -> Result<(), StoreError> {
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable(format!(
                "injected failure writing {}",
                document.describe()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(
        &self,
        kind: DocumentKind,
        name: &str,
    ) -> Result<Option<ConfigDocument>, StoreError> {
        tokio::task::yield_now().await;
        Ok(self
            .documents
            .read()
            .await
            .get(&(kind, name.to_string()))
            .cloned())
    }

    async fn create(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        tokio::task::yield_now().await;
        self.take_injected_failure(document)?;

        let mut documents = self.documents.write().await;
        let key = (document.kind, document.name.clone());
        if documents.contains_key(&key) {
            return Err(StoreError::AlreadyExists(document.describe()));
        }
        let mut stored = document.clone();
        stored.version = Some(self.bump_version());
        documents.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        tokio::task::yield_now().await;
        self.take_injected_failure(document)?;

        let mut documents = self.documents.write().await;
        let key = (document.kind, document.name.clone());
        let current = documents
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(document.describe()))?;
        if current.version != document.version {
            return Err(StoreError::Conflict(format!(
                "{} is at version {:?}, write was based on {:?}",
                document.describe(),
                current.version,
                document.version
            )));
        }
        let mut stored = document.clone();
        stored.version = Some(self.bump_version());
        documents.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}
