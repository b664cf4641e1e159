// crates/sqlgate-server/src/rules.rs
// ============================================================================
// Module: UI Rule Presets
// Description: Built-in rewrite rules selectable from configuration.
// Purpose: Render SQL, JSON, URLs, and Stripe ids legibly in the HTML view.
// Dependencies: regex, serde, serde_json, sqlgate-config, url
// ============================================================================

//! ## Overview
//! Each [`UiRule`] maps to one [`RewriteRule`]. Presets escape any cell text
//! they embed in markup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use serde::de::IgnoredAny;
use sqlgate_config::UiRule;
use url::Url;

use crate::error::GatewayError;
use crate::render::DisplayValue;
use crate::render::RewriteRule;
use crate::render::escape_html;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Text that looks like SQL source.
static SQL_SOURCE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?is)\b(select\s+.*from|create\s+(table|view))\b"));
/// Text that might be JSON.
static JSON_TEXT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"null|true|false|[{},:\[\]]"));
/// Bare URL text.
static URL_TEXT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^https?://\S+$"));
/// Stripe customer and invoice ids.
static STRIPE_ID: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(cus_|in_1)\w+$"));

// ============================================================================
// SECTION: Presets
// ============================================================================

/// Renders SQL source text preformatted.
///
/// # Errors
///
/// Returns [`GatewayError::Init`] only if the built-in pattern is invalid.
pub fn format_sql_source() -> Result<RewriteRule, GatewayError> {
    Ok(RewriteRule::new().value(compile(&SQL_SOURCE)?).apply(|_, text, _| {
        Some(DisplayValue::Markup(format!("<code><pre>{}</pre></code>", escape_html(text))))
    }))
}

/// Renders valid JSON text in a monospace span; declines otherwise.
///
/// # Errors
///
/// Returns [`GatewayError::Init`] only if the built-in pattern is invalid.
pub fn format_json_text() -> Result<RewriteRule, GatewayError> {
    Ok(RewriteRule::new().value(compile(&JSON_TEXT)?).apply(|_, text, _| {
        serde_json::from_str::<IgnoredAny>(text)
            .ok()
            .map(|_| DisplayValue::Markup(format!("<tt>{}</tt>", escape_html(text))))
    }))
}

/// Links URL-shaped text.
///
/// # Errors
///
/// Returns [`GatewayError::Init`] only if the built-in pattern is invalid.
pub fn link_url_text() -> Result<RewriteRule, GatewayError> {
    Ok(RewriteRule::new().value(compile(&URL_TEXT)?).apply(|_, text, _| {
        Some(match Url::parse(text) {
            Ok(url) => DisplayValue::Markup(format!(
                "<a href=\"{}\" referrerpolicy=no-referrer rel=noopener>{}</a>",
                escape_html(url.as_str()),
                escape_html(text)
            )),
            Err(_) => DisplayValue::Text(text.to_string()),
        })
    }))
}

/// Links Stripe customer and invoice ids to the Stripe dashboard.
///
/// # Errors
///
/// Returns [`GatewayError::Init`] only if the built-in pattern is invalid.
pub fn stripe_id_link() -> Result<RewriteRule, GatewayError> {
    Ok(RewriteRule::new().value(compile(&STRIPE_ID)?).apply(|_, text, groups| {
        let kind = match groups.get(1).copied() {
            Some("cus_") => "customer",
            Some("in_1") => "invoice",
            _ => return Some(DisplayValue::Text(text.to_string())),
        };
        Some(DisplayValue::Markup(format!(
            "<a href=\"https://dashboard.stripe.com/{kind}s/{text}\" title=\"{kind} details in \
             Stripe\" referrerpolicy=no-referrer rel=noopener>{text}</a>"
        )))
    }))
}

/// Returns the preset for `rule`.
///
/// # Errors
///
/// Returns [`GatewayError::Init`] only if the preset pattern is invalid.
pub fn preset(rule: UiRule) -> Result<RewriteRule, GatewayError> {
    match rule {
        UiRule::FormatSqlSource => format_sql_source(),
        UiRule::FormatJsonText => format_json_text(),
        UiRule::LinkUrlText => link_url_text(),
        UiRule::StripeIdLink => stripe_id_link(),
    }
}

/// Returns the presets for `rules` in order.
///
/// # Errors
///
/// Returns [`GatewayError::Init`] only if a preset pattern is invalid.
pub fn presets(rules: &[UiRule]) -> Result<Vec<RewriteRule>, GatewayError> {
    rules.iter().copied().map(preset).collect()
}

/// Returns a shared handle to a preset pattern compiled on first use.
fn compile(pattern: &LazyLock<Result<Regex, regex::Error>>) -> Result<Regex, GatewayError> {
    LazyLock::force(pattern)
        .clone()
        .map_err(|err| GatewayError::Init(format!("rule pattern: {err}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::*;

    #[test]
    fn sql_source_is_preformatted_and_escaped() {
        let rule = format_sql_source().unwrap();
        let out = rule.check_apply("sql", "SELECT a < b\nFROM t").unwrap();
        assert_eq!(out, DisplayValue::Markup("<code><pre>SELECT a &lt; b\nFROM t</pre></code>".to_string()));
        assert_eq!(rule.check_apply("sql", "selected items"), None);
    }

    #[test]
    fn json_text_declines_invalid_input() {
        let rule = format_json_text().unwrap();
        assert_eq!(
            rule.check_apply("doc", "{\"a\":[1,true]}"),
            Some(DisplayValue::Markup("<tt>{&#34;a&#34;:[1,true]}</tt>".to_string()))
        );
        assert_eq!(rule.check_apply("doc", "a, b"), None);
        assert_eq!(rule.check_apply("doc", "plain"), None);
    }

    #[test]
    fn url_text_is_linked() {
        let rule = link_url_text().unwrap();
        let out = rule.check_apply("u", "https://example.com/a?b=c&d").unwrap();
        assert_eq!(
            out.as_str(),
            "<a href=\"https://example.com/a?b=c&amp;d\" referrerpolicy=no-referrer \
             rel=noopener>https://example.com/a?b=c&amp;d</a>"
        );
        assert_eq!(rule.check_apply("u", "see https://example.com"), None);
    }

    #[test]
    fn stripe_ids_link_by_kind() {
        let rule = stripe_id_link().unwrap();
        let out = rule.check_apply("id", "cus_123abc").unwrap();
        assert!(out.as_str().contains("https://dashboard.stripe.com/customers/cus_123abc"));
        let out = rule.check_apply("id", "in_1XYZ").unwrap();
        assert!(out.as_str().contains("/invoices/in_1XYZ"));
        assert_eq!(rule.check_apply("id", "sub_123"), None);
    }

    #[test]
    fn every_preset_pattern_compiles() {
        for pattern in [&SQL_SOURCE, &JSON_TEXT, &URL_TEXT, &STRIPE_ID] {
            compile(pattern).unwrap();
        }
        let rules = presets(&[
            UiRule::FormatSqlSource,
            UiRule::FormatJsonText,
            UiRule::LinkUrlText,
            UiRule::StripeIdLink,
        ])
        .unwrap();
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn presets_follow_configured_order() {
        let rules = presets(&[UiRule::FormatJsonText, UiRule::FormatSqlSource]).unwrap();
        assert_eq!(rules.len(), 2);
        let out = rules[0].check_apply("q", "[\"select 1 from t\"]").unwrap();
        assert!(out.as_str().starts_with("<tt>"));
    }
}
