//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs.

use std::path::PathBuf;
use std::time::Duration;

/// Default in-cluster ArgoCD API server address.
pub const DEFAULT_UPSTREAM_URL: &str = "http://argocd-server.argocd.svc.cluster.local:80";

/// Default namespace holding the ArgoCD ConfigMaps and Secrets.
pub const DEFAULT_NAMESPACE: &str = "argocd";

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use argocd_gateway::config::get_env_with_fallback;
///
/// let upstream = get_env_with_fallback("GATEWAY_UPSTREAM_URL", "ARGOCD_SERVER");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        if old_name != new_name {
            tracing::warn!(
                "Environment variable '{}' is deprecated, use '{}' instead",
                old_name,
                new_name
            );
        }
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither variable is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Backend used for ConfigMap / Secret access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StoreBackend {
    /// Kubernetes API (in-cluster or kubeconfig)
    #[default]
    Kube,
    /// Process-local store, for development without a cluster
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kube" | "kubernetes" => Ok(Self::Kube),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Audit log sizing and conflict-retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogConfig {
    /// ConfigMap holding the event list.
    pub document: String,
    /// Maximum number of retained events (oldest evicted first).
    pub capacity: usize,
    /// Read-modify-write attempts per append before the event is dropped.
    pub max_attempts: u32,
    /// First backoff step after a version conflict.
    pub retry_base: Duration,
    /// Upper bound for a single backoff step.
    pub retry_max: Duration,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            document: "cased-audit".to_string(),
            capacity: 1000,
            max_attempts: 5,
            retry_base: Duration::from_millis(20),
            retry_max: Duration::from_millis(500),
        }
    }
}

impl AuditLogConfig {
    /// Load audit configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let capacity =
            get_env_with_fallback_parse("GATEWAY_AUDIT_CAPACITY", "AUDIT_CAPACITY", 1000usize);
        let max_attempts =
            get_env_with_fallback_parse("GATEWAY_AUDIT_MAX_ATTEMPTS", "AUDIT_MAX_ATTEMPTS", 5u32);
        let retry_base_ms = get_env_with_fallback_parse(
            "GATEWAY_AUDIT_RETRY_BASE_MS",
            "AUDIT_RETRY_BASE_MS",
            20u64,
        );

        Self {
            document: get_env_with_fallback_or(
                "GATEWAY_AUDIT_CONFIGMAP",
                "AUDIT_CONFIGMAP",
                &defaults.document,
            ),
            capacity: capacity.max(1),
            max_attempts: max_attempts.max(1),
            retry_base: Duration::from_millis(retry_base_ms),
            retry_max: defaults.retry_max,
        }
    }
}

/// Gateway runtime configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// ArgoCD API server origin that pass-through traffic is forwarded to.
    pub upstream_url: String,
    /// Namespace of the ArgoCD ConfigMaps / Secrets.
    pub namespace: String,
    /// Deadline for a forwarded upstream call.
    pub upstream_timeout: Duration,
    /// Deadline for a single config store call.
    pub store_timeout: Duration,
    /// Deadline for notification test deliveries.
    pub notify_timeout: Duration,
    /// Audit log settings.
    pub audit: AuditLogConfig,
    /// Directory with the dashboard build, served for non-API paths.
    pub static_dir: Option<PathBuf>,
    /// Config store backend.
    pub store_backend: StoreBackend,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            upstream_timeout: Duration::from_secs(60),
            store_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(15),
            audit: AuditLogConfig::default(),
            static_dir: None,
            store_backend: StoreBackend::Kube,
        }
    }
}

impl GatewayConfig {
    /// Load gateway configuration from environment variables.
    pub fn from_env() -> Self {
        let upstream_timeout = get_env_with_fallback_parse(
            "GATEWAY_UPSTREAM_TIMEOUT_SECS",
            "UPSTREAM_TIMEOUT_SECS",
            60u64,
        );
        let store_timeout =
            get_env_with_fallback_parse("GATEWAY_STORE_TIMEOUT_SECS", "STORE_TIMEOUT_SECS", 10u64);
        let notify_timeout = get_env_with_fallback_parse(
            "GATEWAY_NOTIFY_TIMEOUT_SECS",
            "NOTIFY_TIMEOUT_SECS",
            15u64,
        );

        Self {
            upstream_url: get_env_with_fallback_or(
                "GATEWAY_UPSTREAM_URL",
                "ARGOCD_SERVER",
                DEFAULT_UPSTREAM_URL,
            ),
            namespace: get_env_with_fallback_or(
                "GATEWAY_NAMESPACE",
                "ARGOCD_NAMESPACE",
                DEFAULT_NAMESPACE,
            ),
            upstream_timeout: Duration::from_secs(upstream_timeout),
            store_timeout: Duration::from_secs(store_timeout),
            notify_timeout: Duration::from_secs(notify_timeout),
            audit: AuditLogConfig::from_env(),
            static_dir: get_env_with_fallback("GATEWAY_STATIC_DIR", "STATIC_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            store_backend: get_env_with_fallback_parse(
                "GATEWAY_STORE",
                "GATEWAY_STORE",
                StoreBackend::Kube,
            ),
        }
    }
}
