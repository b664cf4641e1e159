// crates/sqlgate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payloads.
// Purpose: Deterministic starting point for `sqlgate init-config`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for the gateway configuration. The output is
//! deterministic and always passes validation.
//!
//! Security posture: examples are static templates and carry no secrets.

/// Returns a canonical example `sqlgate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8080"
route_prefix = ""
query_timeout_ms = 30000
max_query_bytes = 4000
max_rows = 10000
max_display_rows = 500
compression = true

[local_state]
path = "sqlgate-state.db"
source = "local"
label = "sqlgate local state"
journal_mode = "wal"
sync_mode = "full"

[[sources]]
source = "main"
label = "Main database"
driver = "sqlite"
url = "file:main.db?mode=ro"

[sources.named]
tables = "select name from sqlite_schema where type = 'table' order by name"

# [[sources]]
# source = "billing"
# driver = "sqlite"
# key_file = "$HOME/.config/sqlgate/billing.key"

# [secrets]
# dir = "/etc/sqlgate/secrets"
# poll_interval_ms = 30000

[[links]]
anchor = "runbook"
url = "https://example.com/runbook"

[auth]
identity = "none"
policy = "default"

[ui]
rewrite_rules = ["format_sql_source", "format_json_text", "link_url_text"]
null_placeholder = "(null)"
"#,
    )
}
