//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `GatewayError`は`status_code()`と`external_message()`を提供し、
//! `api::error::AppError`経由でHTTPレスポンスに変換される。

use axum::http::StatusCode;
use thiserror::Error;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// 設定ストア（ConfigMap / Secret）操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Version token was stale at write time
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// Create raced with another create
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// Backend unreachable or rejected the call
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer within the deadline
    #[error("Store timeout: {0}")]
    Timeout(String),

    /// Stored content could not be interpreted
    #[error("Invalid document: {0}")]
    Invalid(String),
}

impl StoreError {
    /// 読み直して再試行すれば成功しうる競合か
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::AlreadyExists(_))
    }
}

/// gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Config store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict error (e.g., duplicate resource)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation refused
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Method not supported on a matched path
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Remote service rejected credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Upstream / remote service error
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Audit log append failed
    #[error("Audit error: {0}")]
    Audit(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Common(CommonError::Validation(message.into()))
    }

    /// Returns a safe error message for external clients.
    ///
    /// Full error details (`to_string()`) belong in server logs only.
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::Common(CommonError::Validation(_)) => "Invalid request",
            Self::Common(_) => "Request error",
            Self::Store(StoreError::NotFound(_)) => "Not found",
            Self::Store(StoreError::Conflict(_)) => "Resource was modified concurrently",
            Self::Store(StoreError::AlreadyExists(_)) => "Resource already exists",
            Self::Store(StoreError::Timeout(_)) => "Cluster request timeout",
            Self::Store(_) => "Cluster configuration unavailable",
            Self::NotFound(_) => "Not found",
            Self::Conflict(_) => "Resource conflict",
            Self::Forbidden(_) => "Access denied",
            Self::MethodNotAllowed(_) => "Method not allowed",
            Self::Authentication(_) => "Authentication failed",
            Self::Upstream(_) => "Backend service unavailable",
            Self::Timeout(_) => "Request timeout",
            Self::Audit(_) => "Audit log unavailable",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Detail safe to show the caller, if any.
    ///
    /// Only client-caused errors carry their message out; backend errors
    /// may contain addresses and stay in the logs.
    pub fn client_detail(&self) -> Option<&str> {
        match self {
            Self::Common(CommonError::Validation(msg))
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Forbidden(msg)
            | Self::MethodNotAllowed(msg) => Some(msg.as_str()),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Common(CommonError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Common(CommonError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Common(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Self::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(StoreError::Invalid(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias (Common)
pub type CommonResult<T> = Result<T, CommonError>;

/// Result type alias (gateway)
pub type GatewayResult<T> = Result<T, GatewayError>;
