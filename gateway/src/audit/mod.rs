//! 監査ログ
//!
//! 管理操作と監査対象の転送リクエストが記録するイベントを、
//! 件数上限付きで設定ストアに保持する。

/// 型定義
pub mod types;

/// 追記・検索
pub mod store;

pub use store::AuditLogStore;
pub use types::{AuditAction, AuditEvent, AuditEventList, AuditFilter, Severity};
