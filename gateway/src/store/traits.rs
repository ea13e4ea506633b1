//! 設定ストアのトレイト定義
//!
//! ConfigMap / Secret を名前付きのキー・バリュー文書として扱う。
//! 更新は読み取り時のバージョントークンを伴い、古ければ `StoreError::Conflict` で失敗する。

use crate::common::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// 文書の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    /// 平文（ConfigMap）
    ConfigMap,
    /// 秘匿値（Secret）
    Secret,
}

impl DocumentKind {
    /// 表示用の種別名
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMap => "configmap",
            Self::Secret => "secret",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 名前付きキー・バリュー文書
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    /// 種類
    pub kind: DocumentKind,
    /// 文書名（名前空間内で一意）
    pub name: String,
    /// データ本体
    pub data: BTreeMap<String, String>,
    /// 最後に読み取った時点のバージョン。未作成の文書では `None`
    pub version: Option<String>,
}

impl ConfigDocument {
    /// 未保存の空文書を作る
    pub fn new(kind: DocumentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            data: BTreeMap::new(),
            version: None,
        }
    }

    /// 未保存の空ConfigMap
    pub fn config_map(name: impl Into<String>) -> Self {
        Self::new(DocumentKind::ConfigMap, name)
    }

    /// 未保存の空Secret
    pub fn secret(name: impl Into<String>) -> Self {
        Self::new(DocumentKind::Secret, name)
    }

    /// 値を取得する
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// `kind/name` 形式の識別子（ログ・エラー用）
    pub fn describe(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// 設定ストア
///
/// 実装はクラスタAPI（`KubeConfigStore`）とプロセス内（`InMemoryConfigStore`）。
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 文書を取得する。存在しなければ `Ok(None)`
    async fn get(&self, kind: DocumentKind, name: &str)
        -> Result<Option<ConfigDocument>, StoreError>;

    /// 文書を新規作成する。既存なら `StoreError::AlreadyExists`
    async fn create(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError>;

    /// `document.version` を前提に置き換える。古ければ `StoreError::Conflict`
    async fn update(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError>;

    /// 取得し、なければ空の未保存文書を返す
    async fn get_or_empty(
        &self,
        kind: DocumentKind,
        name: &str,
    ) -> Result<ConfigDocument, StoreError> {
        Ok(self
            .get(kind, name)
            .await?
            .unwrap_or_else(|| ConfigDocument::new(kind, name)))
    }

    /// 未保存なら作成、既存なら更新する
    async fn save(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        if document.version.is_some() {
            self.update(document).await
        } else {
            self.create(document).await
        }
    }
}
