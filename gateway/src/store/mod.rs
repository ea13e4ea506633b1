//! 設定ストア（ConfigMap / Secret）アクセス層

/// トレイト定義
pub mod traits;

/// プロセス内実装
pub mod memory;

/// Kubernetes API 実装
pub mod cluster;

pub use cluster::KubeConfigStore;
pub use memory::InMemoryConfigStore;
pub use traits::{ConfigDocument, ConfigStore, DocumentKind};
