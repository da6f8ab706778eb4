/// Configuration for store sessions and file transfers
///
/// Loading these from files or the environment is left to the caller; every
/// struct deserializes with serde and falls back to sensible defaults.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Configuration value that cannot be used
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid configuration for '{field}': {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Backoff schedule for retryable transport calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,

    /// Delay before the first retry; doubles for each one after
    pub base_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::new(
                "retry.max_delay_ms",
                format!(
                    "must be at least base_delay_ms ({} < {})",
                    self.max_delay_ms, self.base_delay_ms
                ),
            ));
        }
        Ok(())
    }
}

/// Connection settings for one authenticated store session
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Store endpoint, e.g. `https://osdf.example.org:8123`
    pub base_url: String,

    /// Namespace all documents are written to
    pub namespace: String,

    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Page size requested for queries
    pub page_size: usize,

    pub retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8123".to_string(),
            namespace: "ihmp".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 30,
            page_size: 100,
            retry: RetryConfig::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::new(
                "base_url",
                format!("'{}' must start with http:// or https://", self.base_url),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::new("namespace", "must not be empty"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::new("username", "must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::new("timeout_secs", "must be greater than zero"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::new("page_size", "must be greater than zero"));
        }
        self.retry.validate()
    }
}

/// Settings for the external transfer tool
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Executable invoked for every transfer
    pub program: String,

    /// Transfer server host
    pub server: String,

    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Environment variable the tool reads the password from
    pub password_env: String,

    /// Arguments placed before the source and destination
    pub extra_args: Vec<String>,

    /// Scheme used when building file URLs
    pub url_scheme: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            program: "ascp".to_string(),
            server: "aspera.ihmpdcc.org".to_string(),
            username: String::new(),
            password: String::new(),
            password_env: "ASPERA_SCP_PASS".to_string(),
            extra_args: vec!["-QT".to_string(), "-l".to_string(), "200m".to_string()],
            url_scheme: "fasp".to_string(),
        }
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("program", &self.program)
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("password_env", &self.password_env)
            .field("extra_args", &self.extra_args)
            .field("url_scheme", &self.url_scheme)
            .finish()
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::new("program", "must not be empty"));
        }
        if self.server.trim().is_empty() || self.server.contains('/') {
            return Err(ConfigError::new(
                "server",
                format!("'{}' must be a bare host name", self.server),
            ));
        }
        if self.url_scheme.trim().is_empty() {
            return Err(ConfigError::new("url_scheme", "must not be empty"));
        }
        Ok(())
    }
}
