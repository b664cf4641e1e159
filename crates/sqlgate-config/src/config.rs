// crates/sqlgate-config/src/config.rs
// ============================================================================
// Module: sqlgate Configuration
// Description: Configuration loading and validation for the SQL gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, sqlgate-core, sqlgate-store-sqlite, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. Source connection strings
//! may come inline, from a key file, or from the secret store; exactly one is
//! allowed per source.
//! Security posture: config inputs are untrusted; connection strings are
//! secrets and never appear in error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use sqlgate_core::DEFAULT_LABEL;
use sqlgate_core::DEFAULT_MAX_QUERY_BYTES;
use sqlgate_store_sqlite::QueryLogConfig;
use sqlgate_store_sqlite::SqliteStoreMode;
use sqlgate_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "sqlgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SQLGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum key file size in bytes.
const MAX_KEY_FILE_SIZE: u64 = 64 * 1024;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default row cap for one execution.
pub const DEFAULT_MAX_ROWS: usize = 10_000;
/// Default number of rows shown in the HTML UI.
pub const DEFAULT_MAX_DISPLAY_ROWS: usize = 500;
/// Default label of the exported local state source.
pub const DEFAULT_LOCAL_LABEL: &str = "sqlgate local state";
/// Default secret poll interval.
const DEFAULT_SECRET_POLL_MS: u64 = 30_000;
/// Default null placeholder in the UI.
pub const DEFAULT_NULL_PLACEHOLDER: &str = "(null)";
/// Default header carrying the caller login.
const DEFAULT_USER_HEADER: &str = "x-sqlgate-user";
/// Default header carrying the caller node name.
const DEFAULT_NODE_HEADER: &str = "x-sqlgate-node";
/// Default header carrying comma-separated node tags.
const DEFAULT_TAGS_HEADER: &str = "x-sqlgate-tags";
/// Maximum number of configured sources.
const MAX_SOURCES: usize = 256;

// ============================================================================
// SECTION: Root
// ============================================================================

/// Root gateway configuration.
///
/// # Invariants
/// - After [`SqlGateConfig::validate`], source names are unique and each
///   source names exactly one connection origin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlGateConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Optional local query log.
    #[serde(default)]
    pub local_state: Option<LocalStateConfig>,
    /// Queryable sources in presentation order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// UI links.
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    /// Identity and authorization.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Optional secret store.
    #[serde(default)]
    pub secrets: Option<SecretsConfig>,
    /// UI rendering options.
    #[serde(default)]
    pub ui: UiConfig,
}

impl SqlGateConfig {
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
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate(self.server.bind_addr()?)?;
        if let Some(secrets) = &self.secrets {
            secrets.validate()?;
        }
        if let Some(local) = &self.local_state {
            local.validate()?;
        }
        if self.sources.len() > MAX_SOURCES {
            return Err(ConfigError::Invalid("too many sources".to_string()));
        }
        let mut names = BTreeSet::new();
        if let Some(local) = self.local_state.as_ref().and_then(|local| local.source.as_ref()) {
            names.insert(local.clone());
        }
        for source in &mut self.sources {
            source.validate(self.secrets.is_some())?;
            if !names.insert(source.source.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source name \"{}\"",
                    source.source
                )));
            }
        }
        if names.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one source or local_state.source must be configured".to_string(),
            ));
        }
        for link in &self.links {
            link.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server and execution limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Route prefix under which all endpoints are served; empty for root.
    #[serde(default)]
    pub route_prefix: String,
    /// Query timeout in milliseconds; zero disables it.
    #[serde(default)]
    pub query_timeout_ms: u64,
    /// Maximum query text length in bytes.
    #[serde(default = "default_max_query_bytes")]
    pub max_query_bytes: usize,
    /// Row cap for one execution.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Rows shown in the HTML UI.
    #[serde(default = "default_max_display_rows")]
    pub max_display_rows: usize,
    /// Enable response compression.
    #[serde(default = "default_true")]
    pub compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            route_prefix: String::new(),
            query_timeout_ms: 0,
            max_query_bytes: DEFAULT_MAX_QUERY_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
            max_display_rows: DEFAULT_MAX_DISPLAY_ROWS,
            compression: true,
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is invalid: \"{}\"", self.bind)))
    }

    /// Returns the query timeout, if any.
    #[must_use]
    pub const fn query_timeout(&self) -> Option<Duration> {
        if self.query_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.query_timeout_ms))
        }
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if !self.route_prefix.is_empty()
            && (!self.route_prefix.starts_with('/') || self.route_prefix.ends_with('/'))
        {
            return Err(ConfigError::Invalid(
                "server.route_prefix must start with '/' and not end with '/'".to_string(),
            ));
        }
        if self.max_query_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_query_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_rows == 0 {
            return Err(ConfigError::Invalid(
                "server.max_rows must be greater than zero".to_string(),
            ));
        }
        if self.max_display_rows == 0 {
            return Err(ConfigError::Invalid(
                "server.max_display_rows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Local State
// ============================================================================

/// Local query log settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalStateConfig {
    /// Path to the log database.
    pub path: String,
    /// Source name under which the log is exported read-only.
    #[serde(default)]
    pub source: Option<String>,
    /// Label of the exported source.
    #[serde(default = "default_local_label")]
    pub label: String,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl LocalStateConfig {
    /// Returns the store configuration for the log.
    #[must_use]
    pub fn query_log_config(&self) -> QueryLogConfig {
        QueryLogConfig {
            path: PathBuf::from(&self.path),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }

    /// Validates local state settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("local_state.path", &self.path)?;
        if let Some(source) = &self.source
            && source.trim().is_empty()
        {
            return Err(ConfigError::Invalid("local_state.source must be non-empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Sources
// ============================================================================

/// One queryable source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Unique source name.
    pub source: String,
    /// Human-readable label.
    #[serde(default = "default_label")]
    pub label: String,
    /// Driver name.
    #[serde(default)]
    pub driver: String,
    /// Inline connection string.
    #[serde(default)]
    pub url: Option<String>,
    /// File holding the connection string; `$VAR` references are expanded.
    #[serde(default)]
    pub key_file: Option<String>,
    /// Secret-store entry holding the connection string.
    #[serde(default)]
    pub secret: Option<String>,
    /// Named queries.
    #[serde(default)]
    pub named: BTreeMap<String, String>,
}

/// Where a source's connection string comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConnection {
    /// Inline connection string.
    Url(String),
    /// File holding the connection string.
    KeyFile(PathBuf),
    /// Secret-store entry.
    Secret(String),
}

impl SourceConfig {
    /// Returns the connection origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless exactly one origin is set.
    pub fn connection(&self) -> Result<SourceConnection, ConfigError> {
        match (&self.url, &self.key_file, &self.secret) {
            (Some(url), None, None) => Ok(SourceConnection::Url(url.clone())),
            (None, Some(key_file), None) => Ok(SourceConnection::KeyFile(PathBuf::from(
                expand_env(key_file),
            ))),
            (None, None, Some(secret)) => Ok(SourceConnection::Secret(secret.clone())),
            (None, None, None) => Err(ConfigError::Invalid(format!(
                "source \"{}\": one of url, key_file, or secret is required",
                self.source
            ))),
            _ => Err(ConfigError::Invalid(format!(
                "source \"{}\": only one of url, key_file, or secret may be set",
                self.source
            ))),
        }
    }

    /// Validates the source entry.
    fn validate(&mut self, has_secret_store: bool) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("sources.source must be non-empty".to_string()));
        }
        if self.driver.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "source \"{}\": driver is required",
                self.source
            )));
        }
        if self.label.trim().is_empty() {
            self.label = DEFAULT_LABEL.to_string();
        }
        match self.connection()? {
            SourceConnection::Secret(_) if !has_secret_store => Err(ConfigError::Invalid(
                format!("source \"{}\": secret requires a [secrets] section", self.source),
            )),
            SourceConnection::KeyFile(path) => {
                validate_path_string("sources.key_file", &path.to_string_lossy())
            }
            _ => Ok(()),
        }
    }
}

/// Reads a key file's connection string, trimming surrounding whitespace.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file is unreadable, oversized, or empty.
pub fn read_key_file(path: &Path) -> Result<String, ConfigError> {
    let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    if metadata.len() > MAX_KEY_FILE_SIZE {
        return Err(ConfigError::Invalid("key file exceeds size limit".to_string()));
    }
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid("key file is empty".to_string()));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// SECTION: Links
// ============================================================================

/// UI link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Link text.
    pub anchor: String,
    /// Link target.
    pub url: String,
}

impl LinkConfig {
    /// Validates the link.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.anchor.trim().is_empty() || self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("links require anchor and url".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// How callers are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// No identity check; every caller is allowed.
    #[default]
    None,
    /// Identity is asserted by a trusted front proxy via headers.
    TrustedHeader,
}

/// Which authorizer decides per-source access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Reject tagged nodes; allow logged-in users.
    #[default]
    Default,
    /// Per-source login allow lists in `auth.access`.
    AccessMap,
    /// Per-principal source grants in `auth.principals`.
    Grants,
}

/// Principal with explicit source grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalConfig {
    /// Caller login.
    pub login: String,
    /// Granted sources; `*` grants all.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Identity and authorization settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Identity mode.
    #[serde(default)]
    pub identity: IdentityMode,
    /// Header carrying the caller login.
    #[serde(default = "default_user_header")]
    pub user_header: String,
    /// Header carrying the caller node name.
    #[serde(default = "default_node_header")]
    pub node_header: String,
    /// Header carrying comma-separated node tags.
    #[serde(default = "default_tags_header")]
    pub tags_header: String,
    /// Authorization policy.
    #[serde(default)]
    pub policy: AuthPolicy,
    /// Source to allowed logins, for [`AuthPolicy::AccessMap`].
    #[serde(default)]
    pub access: BTreeMap<String, Vec<String>>,
    /// Principals with grants, for [`AuthPolicy::Grants`].
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity: IdentityMode::None,
            user_header: default_user_header(),
            node_header: default_node_header(),
            tags_header: default_tags_header(),
            policy: AuthPolicy::Default,
            access: BTreeMap::new(),
            principals: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Validates auth settings against the bind address.
    fn validate(&self, bind: SocketAddr) -> Result<(), ConfigError> {
        if self.identity == IdentityMode::None && !bind.ip().is_loopback() {
            return Err(ConfigError::Invalid(
                "non-loopback bind requires auth.identity other than none".to_string(),
            ));
        }
        for (field, value) in [
            ("auth.user_header", &self.user_header),
            ("auth.node_header", &self.node_header),
            ("auth.tags_header", &self.tags_header),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
            }
        }
        let mut logins = BTreeSet::new();
        for principal in &self.principals {
            if principal.login.trim().is_empty() {
                return Err(ConfigError::Invalid("auth.principals.login must be set".to_string()));
            }
            if !logins.insert(principal.login.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate principal \"{}\"",
                    principal.login
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// Directory-backed secret store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// Directory holding one file per secret.
    pub dir: String,
    /// Poll interval in milliseconds.
    #[serde(default = "default_secret_poll_ms")]
    pub poll_interval_ms: u64,
}

impl SecretsConfig {
    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates secret store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("secrets.dir", &self.dir)?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "secrets.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: UI
// ============================================================================

/// Built-in UI rewrite rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiRule {
    /// Render SQL source text as preformatted code.
    FormatSqlSource,
    /// Render JSON text in a monospace span.
    FormatJsonText,
    /// Render bare URLs as links.
    LinkUrlText,
    /// Link Stripe customer and invoice ids.
    StripeIdLink,
}

/// UI rendering options.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UiConfig {
    /// Rewrite rules in evaluation order.
    #[serde(default = "default_rewrite_rules")]
    pub rewrite_rules: Vec<UiRule>,
    /// Text shown for NULL cells.
    #[serde(default = "default_null_placeholder")]
    pub null_placeholder: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            rewrite_rules: default_rewrite_rules(),
            null_placeholder: default_null_placeholder(),
        }
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
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default query length budget.
const fn default_max_query_bytes() -> usize {
    DEFAULT_MAX_QUERY_BYTES
}

/// Default row cap.
const fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

/// Default display row cap.
const fn default_max_display_rows() -> usize {
    DEFAULT_MAX_DISPLAY_ROWS
}

/// Default for boolean switches that start enabled.
const fn default_true() -> bool {
    true
}

/// Default source label.
fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

/// Default local source label.
fn default_local_label() -> String {
    DEFAULT_LOCAL_LABEL.to_string()
}

/// Default busy timeout for the log.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Default secret poll interval.
const fn default_secret_poll_ms() -> u64 {
    DEFAULT_SECRET_POLL_MS
}

/// Default user header.
fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_string()
}

/// Default node header.
fn default_node_header() -> String {
    DEFAULT_NODE_HEADER.to_string()
}

/// Default tags header.
fn default_tags_header() -> String {
    DEFAULT_TAGS_HEADER.to_string()
}

/// Default rewrite rules.
fn default_rewrite_rules() -> Vec<UiRule> {
    vec![UiRule::FormatSqlSource, UiRule::FormatJsonText]
}

/// Default null placeholder.
fn default_null_placeholder() -> String {
    DEFAULT_NULL_PLACEHOLDER.to_string()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit path, env var, or default.
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
            return Err(ConfigError::Invalid(format!("{field} component too long")));
        }
    }
    Ok(())
}

/// Expands `$VAR` and `${VAR}` references; unset variables expand to nothing.
#[must_use]
pub fn expand_env(value: &str) -> String {
    expand_with(value, |name| env::var(name).ok())
}

/// Expands variable references using `lookup`.
fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[.. pos]);
        let after = &rest[pos + 1 ..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[.. end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[.. end], end)
        };
        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        if let Some(expanded) = lookup(name) {
            out.push_str(&expanded);
        }
        rest = &after[consumed ..];
    }
    out.push_str(rest);
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
