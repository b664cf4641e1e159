// crates/sqlgate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for sqlgate-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use sqlgate_config::ConfigError;
use sqlgate_config::SourceConfig;
use sqlgate_config::SqlGateConfig;

/// Result type shared by config tests.
pub type TestResult = Result<(), String>;

/// Parses a TOML string into a `SqlGateConfig` without validation.
pub fn config_from_toml(toml_str: &str) -> Result<SqlGateConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a config with one inline sqlite source.
pub fn minimal_config() -> Result<SqlGateConfig, toml::de::Error> {
    config_from_toml(
        r#"
[[sources]]
source = "main"
driver = "sqlite"
url = "file:main.db"
"#,
    )
}

/// Returns an inline sqlite source named `name`.
pub fn source(name: &str) -> SourceConfig {
    SourceConfig {
        source: name.to_string(),
        label: "Label".to_string(),
        driver: "sqlite".to_string(),
        url: Some(format!("file:{name}.db")),
        key_file: None,
        secret: None,
        named: std::collections::BTreeMap::new(),
    }
}

/// Asserts that `result` is an error whose message contains `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
