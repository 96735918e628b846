// crates/sitegate-config/src/config.rs
// ============================================================================
// Module: Sitegate Configuration
// Description: Configuration loading and validation for sitegate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: sitegate-core, serde, time, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: a process never starts with
//! an ambiguous virtual-host table.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use sitegate_core::AccessLevel;
use sitegate_core::AccountStatus;
use sitegate_core::PublicationKind;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "sitegate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SITEGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum configured request body size.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 64 * 1024 * 1024;
/// Maximum configured retry budget.
pub(crate) const MAX_RETRIES_LIMIT: u32 = 16;
/// Maximum number of configured sites.
pub(crate) const MAX_SITES: usize = 64;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8085";
/// Default maximum request body size.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default retry budget.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default session cookie name.
const DEFAULT_SESSION_COOKIE: &str = "sitegate_session";
/// Default access-token timestamp skew in seconds.
const DEFAULT_TIMESTAMP_SKEW_SECS: u64 = 60 * 60;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SitegateConfig {
    /// Listener and publication settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Virtual-host table.
    pub vhosts: VhostsConfig,
    /// Seed data for the in-memory credential stores.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl SitegateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.vhosts.validate()?;
        self.auth.validate()?;
        // Building the classifier rejects duplicate hosts and overlapping rules.
        self.classifier()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Publication log sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// `tracing` events.
    Tracing,
    /// Discard events.
    None,
}

/// Listener and publication settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Main listener address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Default retry budget per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cookie carrying the browser session token.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Publication log sink.
    #[serde(default)]
    pub log: LogSinkKind,
    /// Log path, required when `log = "file"`.
    #[serde(default)]
    pub log_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_retries: DEFAULT_MAX_RETRIES,
            session_cookie: default_session_cookie(),
            log: LogSinkKind::default(),
            log_path: None,
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address is invalid.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid(format!("server.max_retries exceeds {MAX_RETRIES_LIMIT}")));
        }
        if !is_token(&self.session_cookie) {
            return Err(ConfigError::Invalid("server.session_cookie must be a cookie name token".to_string()));
        }
        match (&self.log, &self.log_path) {
            (LogSinkKind::File, None) => {
                return Err(ConfigError::Invalid("server.log_path is required for file logging".to_string()));
            }
            (_, Some(path)) => validate_path_string("server.log_path", path)?,
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Virtual Hosts
// ============================================================================

/// Virtual-host table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VhostsConfig {
    /// Derive `https` root URLs when no explicit root URL is given.
    #[serde(default)]
    pub use_https: bool,
    /// Site entries.
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// One virtual-host site.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Site name.
    pub name: String,
    /// Publication kind served by the site.
    pub kind: PublicationKind,
    /// Canonical hostname.
    pub hostname: String,
    /// Space and/or comma separated alternate hostnames.
    #[serde(default)]
    pub althostnames: Option<String>,
    /// Explicit root URL.
    #[serde(default)]
    pub rooturl: Option<String>,
    /// Answer requests that carry no hostname.
    #[serde(default)]
    pub handles_unmatched_host: bool,
    /// Restricted listener port.
    #[serde(default)]
    pub private_port: Option<u16>,
    /// Accepted methods override.
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Accepted content types override.
    #[serde(default)]
    pub content_types: Option<Vec<String>>,
    /// Retry budget override.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl VhostsConfig {
    /// Validates the site table.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sites.is_empty() {
            return Err(ConfigError::Invalid("vhosts.sites must list at least one site".to_string()));
        }
        if self.sites.len() > MAX_SITES {
            return Err(ConfigError::Invalid(format!("vhosts.sites exceeds {MAX_SITES} entries")));
        }
        let fallbacks = self.sites.iter().filter(|site| site.handles_unmatched_host).count();
        if fallbacks > 1 {
            return Err(ConfigError::Invalid(
                "at most one site may set handles_unmatched_host".to_string(),
            ));
        }
        for site in &self.sites {
            site.validate()?;
        }
        Ok(())
    }
}

impl SiteConfig {
    /// Validates one site entry.
    fn validate(&self) -> Result<(), ConfigError> {
        let field = |name: &str| format!("vhosts.sites[{}].{name}", self.name);
        if self.private_port == Some(0) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", field("private_port"))));
        }
        if let Some(methods) = &self.methods {
            if methods.is_empty() {
                return Err(ConfigError::Invalid(format!("{} must be non-empty", field("methods"))));
            }
            for method in methods {
                if !is_token(method) || method.chars().any(|ch| ch.is_ascii_lowercase()) {
                    return Err(ConfigError::Invalid(format!(
                        "{} entry {method} must be an uppercase token",
                        field("methods")
                    )));
                }
            }
        }
        if let Some(content_types) = &self.content_types {
            for content_type in content_types {
                let valid = content_type
                    .split_once('/')
                    .is_some_and(|(kind, subtype)| is_token(kind) && is_token(subtype));
                if !valid {
                    return Err(ConfigError::Invalid(format!(
                        "{} entry {content_type} must be a media type",
                        field("content_types")
                    )));
                }
            }
        }
        if self.max_retries.is_some_and(|retries| retries > MAX_RETRIES_LIMIT) {
            return Err(ConfigError::Invalid(format!("{} exceeds {MAX_RETRIES_LIMIT}", field("max_retries"))));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Auth Seed Data
// ============================================================================

/// Seed data for the in-memory credential stores.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Accepted access-token timestamp skew in seconds.
    #[serde(default = "default_timestamp_skew_secs")]
    pub timestamp_skew_secs: u64,
    /// Basic-auth accounts.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Browser sessions.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
    /// Registered access-token consumers.
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
    /// Issued access tokens.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timestamp_skew_secs: DEFAULT_TIMESTAMP_SKEW_SECS,
            accounts: Vec::new(),
            sessions: Vec::new(),
            consumers: Vec::new(),
            tokens: Vec::new(),
        }
    }
}

/// Basic-auth account.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// User id, also the login.
    pub user_id: String,
    /// Password.
    pub password: String,
    /// Account status.
    #[serde(default = "default_account_status")]
    pub status: AccountStatus,
}

/// Browser session.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Session token.
    pub token: String,
    /// Owning user id.
    pub user_id: String,
}

/// Access-token consumer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    /// Consumer key.
    pub key: String,
}

/// Issued access token.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Token key.
    pub key: String,
    /// Token secret.
    pub secret: String,
    /// Consumer key the token was issued to.
    pub consumer: String,
    /// Owning account user id.
    pub owner: String,
    /// Reviewed access level.
    pub level: AccessLevel,
    /// Reviewed access target.
    #[serde(default)]
    pub target: Option<String>,
    /// Expiry (RFC 3339).
    #[serde(default)]
    pub expires: Option<String>,
}

impl TokenConfig {
    /// Returns the parsed expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the expiry is not RFC 3339.
    pub fn expires_at(&self) -> Result<Option<OffsetDateTime>, ConfigError> {
        self.expires
            .as_deref()
            .map(|raw| {
                OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| {
                    ConfigError::Invalid(format!("auth.tokens[{}].expires: {err}", self.key))
                })
            })
            .transpose()
    }
}

impl AuthConfig {
    /// Validates seed data references.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut users = BTreeSet::new();
        for account in &self.accounts {
            if account.user_id.trim().is_empty() || account.user_id.contains(':') {
                return Err(ConfigError::Invalid(
                    "auth.accounts user_id must be non-empty and contain no colon".to_string(),
                ));
            }
            if !users.insert(account.user_id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate auth account {}", account.user_id)));
            }
        }
        for session in &self.sessions {
            if session.token.trim().is_empty() {
                return Err(ConfigError::Invalid("auth.sessions token must be non-empty".to_string()));
            }
            if !users.contains(session.user_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "auth.sessions references unknown account {}",
                    session.user_id
                )));
            }
        }
        let consumers: BTreeSet<&str> = self.consumers.iter().map(|consumer| consumer.key.as_str()).collect();
        if consumers.iter().any(|key| key.trim().is_empty()) {
            return Err(ConfigError::Invalid("auth.consumers key must be non-empty".to_string()));
        }
        let mut tokens = BTreeSet::new();
        for token in &self.tokens {
            if token.key.trim().is_empty() {
                return Err(ConfigError::Invalid("auth.tokens key must be non-empty".to_string()));
            }
            if !consumers.contains(token.consumer.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "auth.tokens[{}] references unknown consumer {}",
                    token.key, token.consumer
                )));
            }
            if !users.contains(token.owner.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "auth.tokens[{}] references unknown owner {}",
                    token.key, token.owner
                )));
            }
            if !tokens.insert((token.consumer.as_str(), token.key.as_str())) {
                return Err(ConfigError::Invalid(format!("duplicate auth token {}", token.key)));
            }
            token.expires_at()?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default maximum request body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default retry budget.
const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Default session cookie name.
fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

/// Default timestamp skew.
const fn default_timestamp_skew_secs() -> u64 {
    DEFAULT_TIMESTAMP_SKEW_SECS
}

/// Default account status.
const fn default_account_status() -> AccountStatus {
    AccountStatus::Active
}

/// Returns true for a non-empty HTTP token.
fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(ch))
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
