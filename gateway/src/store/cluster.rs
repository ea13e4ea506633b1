//! Kubernetes API を使う設定ストア
//!
//! ConfigMap / Secret の `data` だけを文書として扱い、ラベルやアノテーションなど
//! 他のフィールドは書き戻し時に保持する。楽観的排他は `resourceVersion` で行う。

use super::traits::{ConfigDocument, ConfigStore, DocumentKind};
use crate::common::error::StoreError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Kubernetes API 設定ストア
#[derive(Clone)]
pub struct KubeConfigStore {
    client: kube::Client,
    namespace: String,
    timeout: Duration,
}

impl KubeConfigStore {
    /// 既定のkubeconfig / in-cluster設定からクライアントを作る
    pub async fn connect(namespace: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = kube::Client::try_default()
            .await
            .map_err(|e| StoreError::Unavailable(format!("kubernetes client: {e}")))?;
        Ok(Self::new(client, namespace, timeout))
    }

    /// 既存クライアントから作る
    pub fn new(client: kube::Client, namespace: &str, timeout: Duration) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            timeout,
        }
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| map_kube_error(what, e)),
            Err(_) => Err(StoreError::Timeout(format!(
                "{what} did not complete within {:?}",
                self.timeout
            ))),
        }
    }

    fn metadata(&self, name: &str, version: Option<String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            resource_version: version,
            ..Default::default()
        }
    }

    fn check_version(
        document: &ConfigDocument,
        current: Option<&String>,
    ) -> Result<(), StoreError> {
        if current != document.version.as_ref() {
            return Err(StoreError::Conflict(format!(
                "{} changed since it was read",
                document.describe()
            )));
        }
        Ok(())
    }
}

fn map_kube_error(what: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(what.to_string()),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(what.to_string())
        }
        kube::Error::Api(resp) if resp.code == 409 => {
            StoreError::Conflict(format!("{what}: {}", resp.message))
        }
        other => StoreError::Unavailable(format!("{what}: {other}")),
    }
}

fn config_map_document(cm: ConfigMap, name: &str) -> ConfigDocument {
    ConfigDocument {
        kind: DocumentKind::ConfigMap,
        name: name.to_string(),
        data: cm.data.unwrap_or_default(),
        version: cm.metadata.resource_version,
    }
}

fn secret_document(secret: Secret, name: &str) -> ConfigDocument {
    let data = secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
        .collect();
    ConfigDocument {
        kind: DocumentKind::Secret,
        name: name.to_string(),
        data,
        version: secret.metadata.resource_version,
    }
}

fn secret_bytes(data: &BTreeMap<String, String>) -> BTreeMap<String, ByteString> {
    data.iter()
        .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
        .collect()
}

/// 書き戻すSecretデータを組み立てる
///
/// 文書上の値が読み取り時と変わらないキーは元のバイト列をそのまま残す。
/// UTF-8でない値（署名鍵やTLS鍵）は文書上では置換文字になっているため、
/// 再エンコードすると壊れる。文書から消えたキーは削除する。
fn merge_secret_data(
    current: BTreeMap<String, ByteString>,
    desired: &BTreeMap<String, String>,
) -> BTreeMap<String, ByteString> {
    let mut current = current;
    desired
        .iter()
        .map(|(key, value)| match current.remove(key) {
            Some(bytes) if String::from_utf8_lossy(&bytes.0) == value.as_str() => {
                (key.clone(), bytes)
            }
            _ => (key.clone(), ByteString(value.as_bytes().to_vec())),
        })
        .collect()
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn get(
        &self,
        kind: DocumentKind,
        name: &str,
    ) -> Result<Option<ConfigDocument>, StoreError> {
        let what = format!("get {kind}/{name}");
        match kind {
            DocumentKind::ConfigMap => {
                let api = self.config_maps();
                let found = self.call(&what, api.get_opt(name)).await?;
                Ok(found.map(|cm| config_map_document(cm, name)))
            }
            DocumentKind::Secret => {
                let api = self.secrets();
                let found = self.call(&what, api.get_opt(name)).await?;
                Ok(found.map(|s| secret_document(s, name)))
            }
        }
    }

    async fn create(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        let what = format!("create {}", document.describe());
        debug!(document = %document.describe(), "creating document");
        let params = PostParams::default();
        match document.kind {
            DocumentKind::ConfigMap => {
                let api = self.config_maps();
                let cm = ConfigMap {
                    metadata: self.metadata(&document.name, None),
                    data: Some(document.data.clone()),
                    ..Default::default()
                };
                let created = self.call(&what, api.create(&params, &cm)).await?;
                Ok(config_map_document(created, &document.name))
            }
            DocumentKind::Secret => {
                let api = self.secrets();
                let secret = Secret {
                    metadata: self.metadata(&document.name, None),
                    data: Some(secret_bytes(&document.data)),
                    type_: Some("Opaque".to_string()),
                    ..Default::default()
                };
                let created = self.call(&what, api.create(&params, &secret)).await?;
                Ok(secret_document(created, &document.name))
            }
        }
    }

    async fn update(&self, document: &ConfigDocument) -> Result<ConfigDocument, StoreError> {
        let what = format!("update {}", document.describe());
        debug!(
            document = %document.describe(),
            version = ?document.version,
            "replacing document"
        );
        let params = PostParams::default();
        match document.kind {
            DocumentKind::ConfigMap => {
                let api = self.config_maps();
                let mut current = self
                    .call(&what, api.get_opt(&document.name))
                    .await?
                    .ok_or_else(|| StoreError::NotFound(document.describe()))?;
                Self::check_version(document, current.metadata.resource_version.as_ref())?;
                current.data = Some(document.data.clone());
                let replaced = self
                    .call(&what, api.replace(&document.name, &params, &current))
                    .await?;
                Ok(config_map_document(replaced, &document.name))
            }
            DocumentKind::Secret => {
                let api = self.secrets();
                let mut current = self
                    .call(&what, api.get_opt(&document.name))
                    .await?
                    .ok_or_else(|| StoreError::NotFound(document.describe()))?;
                Self::check_version(document, current.metadata.resource_version.as_ref())?;
                let existing = current.data.take().unwrap_or_default();
                current.data = Some(merge_secret_data(existing, &document.data));
                current.string_data = None;
                let replaced = self
                    .call(&what, api.replace(&document.name, &params, &current))
                    .await?;
                Ok(secret_document(replaced, &document.name))
            }
        }
    }
}
