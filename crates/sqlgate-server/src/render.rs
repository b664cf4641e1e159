// crates/sqlgate-server/src/render.rs
// ============================================================================
// Module: Result Renderer
// Description: Display, CSV, and JSON renderings of query results.
// Purpose: Coerce heterogeneous result cells into safe output forms.
// Dependencies: base64, csv, regex, serde_json, sqlgate-core, time
// ============================================================================

//! ## Overview
//! Every cell is first converted to text by [`value_to_string`]. The HTML path
//! then runs the ordered [`RewriteRule`] list; the first rule whose patterns
//! match and whose apply function produces a value wins. CSV uses plain text
//! with no rules. JSON rows keep numbers as numbers and are encoded one line
//! at a time so large results can be streamed.
//! Security posture: cell contents are untrusted; only [`DisplayValue::Markup`]
//! produced by a rule is emitted without escaping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use regex::Regex;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use sqlgate_core::QueryResult;
use sqlgate_core::SqlValue;
use time::OffsetDateTime;
use time::Time;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::error::GatewayError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Display granularity for elapsed times.
const ELAPSED_GRANULARITY: Duration = Duration::from_micros(100);

// ============================================================================
// SECTION: Cell Text
// ============================================================================

/// Converts a cell to text, substituting `null` for NULL.
///
/// Blobs that are valid UTF-8 are returned as text; others are encoded as
/// unpadded base64. Timestamps are rendered in UTC as RFC 3339, or as a bare
/// date when the time of day is exactly midnight.
#[must_use]
pub fn value_to_string(value: &SqlValue, null: &str) -> String {
    match value {
        SqlValue::Null => null.to_string(),
        SqlValue::Integer(value) => value.to_string(),
        SqlValue::Float(value) => value.to_string(),
        SqlValue::Text(value) => value.clone(),
        SqlValue::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => STANDARD_NO_PAD.encode(bytes),
        },
        SqlValue::Timestamp(ts) => format_timestamp(*ts),
    }
}

/// Formats a timestamp for display.
#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    let formatted = if utc.time() == Time::MIDNIGHT {
        utc.format(format_description!("[year]-[month]-[day]"))
    } else {
        utc.format(&Rfc3339)
    };
    formatted.unwrap_or_else(|_| utc.to_string())
}

/// Escapes text for inclusion in HTML content or attribute values.
#[must_use]
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['<', '>', '&', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

// ============================================================================
// SECTION: Rewrite Rules
// ============================================================================

/// Rendered display cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    /// Plain text; escaped when emitted as HTML.
    Text(String),
    /// Trusted markup produced by a rewrite rule; emitted verbatim.
    Markup(String),
}

impl DisplayValue {
    /// Returns the raw text or markup.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) | Self::Markup(text) => text,
        }
    }

    /// Returns HTML for this cell.
    #[must_use]
    pub fn to_html(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => escape_html(text),
            Self::Markup(markup) => Cow::Borrowed(markup),
        }
    }
}

/// Rewrite callback: column name, cell text, and value-pattern groups
/// (group 0 is the whole match; unmatched groups are empty). Returning `None`
/// declines, and evaluation moves on to the next rule.
pub type ApplyFn = dyn Fn(&str, &str, &[&str]) -> Option<DisplayValue> + Send + Sync;

/// Column/value rewrite rule for the HTML view.
///
/// # Invariants
/// - An absent pattern matches everything.
/// - A rule without an apply function passes the text through unchanged.
#[derive(Clone, Default)]
pub struct RewriteRule {
    /// Column name pattern.
    column: Option<Regex>,
    /// Cell text pattern.
    value: Option<Regex>,
    /// Replacement callback.
    apply: Option<Arc<ApplyFn>>,
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteRule")
            .field("column", &self.column.as_ref().map(Regex::as_str))
            .field("value", &self.value.as_ref().map(Regex::as_str))
            .field("apply", &self.apply.is_some())
            .finish()
    }
}

impl RewriteRule {
    /// Creates a rule that matches every cell and changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the rule to columns matching `pattern`.
    #[must_use]
    pub fn column(mut self, pattern: Regex) -> Self {
        self.column = Some(pattern);
        self
    }

    /// Restricts the rule to cell text matching `pattern`.
    #[must_use]
    pub fn value(mut self, pattern: Regex) -> Self {
        self.value = Some(pattern);
        self
    }

    /// Sets the replacement callback.
    #[must_use]
    pub fn apply(
        mut self,
        apply: impl Fn(&str, &str, &[&str]) -> Option<DisplayValue> + Send + Sync + 'static,
    ) -> Self {
        self.apply = Some(Arc::new(apply));
        self
    }

    /// Returns the replacement for `input` in `column`, or `None` when the
    /// rule does not match or declines.
    #[must_use]
    pub fn check_apply(&self, column: &str, input: &str) -> Option<DisplayValue> {
        if let Some(pattern) = &self.column
            && !pattern.is_match(column)
        {
            return None;
        }
        let groups: Vec<&str> = match &self.value {
            Some(pattern) => {
                let captures = pattern.captures(input)?;
                captures.iter().map(|group| group.map_or("", |m| m.as_str())).collect()
            }
            None => Vec::new(),
        };
        match &self.apply {
            Some(apply) => apply(column, input, &groups),
            None => Some(DisplayValue::Text(input.to_string())),
        }
    }
}

/// Applies the first matching rule, falling back to plain text.
fn rewrite(rules: &[RewriteRule], column: &str, text: String) -> DisplayValue {
    for rule in rules {
        if let Some(value) = rule.check_apply(column, &text) {
            return value;
        }
    }
    DisplayValue::Text(text)
}

// ============================================================================
// SECTION: Display
// ============================================================================

/// Result converted for the HTML view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayResult {
    /// Column names.
    pub columns: Vec<String>,
    /// Rendered rows.
    pub rows: Vec<Vec<DisplayValue>>,
    /// Rows fetched by execution.
    pub num_rows: usize,
    /// Execution time, rounded for display.
    pub elapsed: Duration,
    /// Set when fewer rows are shown than were fetched.
    pub truncated: bool,
    /// Set when the source had more rows than the row cap.
    pub more: bool,
}

/// Renders `result` for display.
#[must_use]
pub fn to_display(result: &QueryResult, null: &str, rules: &[RewriteRule]) -> DisplayResult {
    let rows = result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(index, value)| {
                    let column = result.columns.get(index).map_or("", String::as_str);
                    rewrite(rules, column, value_to_string(value, null))
                })
                .collect()
        })
        .collect();
    DisplayResult {
        columns: result.columns.clone(),
        rows,
        num_rows: result.num_rows,
        elapsed: round_elapsed(result.elapsed),
        truncated: result.truncated,
        more: result.more,
    }
}

/// Rounds `elapsed` to the display granularity.
fn round_elapsed(elapsed: Duration) -> Duration {
    let step = ELAPSED_GRANULARITY.as_nanos();
    let rounded = (elapsed.as_nanos() + step / 2) / step * step;
    Duration::from_nanos(u64::try_from(rounded).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: CSV
// ============================================================================

/// Renders `result` as CSV with a header row. A result without columns
/// produces no output.
///
/// # Errors
///
/// Returns [`GatewayError::Execution`] when encoding fails.
pub fn to_csv(result: &QueryResult) -> Result<Vec<u8>, GatewayError> {
    if result.columns.is_empty() {
        return Ok(Vec::new());
    }
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(&result.columns).map_err(csv_error)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(|value| value_to_string(value, ""))).map_err(csv_error)?;
    }
    writer.into_inner().map_err(|err| GatewayError::Execution(format!("csv encoding: {err}")))
}

/// Maps a CSV writer failure.
fn csv_error(err: csv::Error) -> GatewayError {
    GatewayError::Execution(format!("csv encoding: {err}"))
}

// ============================================================================
// SECTION: JSON
// ============================================================================

/// Converts a cell to JSON.
///
/// Non-finite floats become null. Blobs that are not valid UTF-8 become
/// padded base64 strings.
#[must_use]
pub fn json_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Number((*value).into()),
        SqlValue::Float(value) => Number::from_f64(*value).map_or(Value::Null, Value::Number),
        SqlValue::Text(value) => Value::String(value.clone()),
        SqlValue::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::String(STANDARD.encode(bytes)),
        },
        SqlValue::Timestamp(ts) => {
            let utc = ts.to_offset(UtcOffset::UTC);
            Value::String(utc.format(&Rfc3339).unwrap_or_else(|_| utc.to_string()))
        }
    }
}

/// Converts one row to a column-name-to-value object.
#[must_use]
pub fn json_row(columns: &[String], row: &[SqlValue]) -> Map<String, Value> {
    columns.iter().cloned().zip(row.iter().map(json_value)).collect()
}

/// Encodes one row as a JSON line terminated by `\n`.
///
/// # Errors
///
/// Returns [`GatewayError::Execution`] when encoding fails.
pub fn json_line(columns: &[String], row: &[SqlValue]) -> Result<Vec<u8>, GatewayError> {
    let mut line = serde_json::to_vec(&json_row(columns, row))
        .map_err(|err| GatewayError::Execution(format!("json encoding: {err}")))?;
    line.push(b'\n');
    Ok(line)
}

/// Returns a lazy iterator of JSON lines, one per row of `result`.
pub fn json_lines(result: QueryResult) -> impl Iterator<Item = Result<Vec<u8>, GatewayError>> {
    let columns = result.columns;
    result.rows.into_iter().map(move |row| json_line(&columns, &row))
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

    use time::macros::datetime;

    use super::*;

    fn fruit() -> QueryResult {
        QueryResult::new(
            vec!["id".to_string(), "value".to_string()],
            vec![
                vec![SqlValue::Integer(1), SqlValue::from("apple")],
                vec![SqlValue::Integer(2), SqlValue::from("pear")],
            ],
        )
    }

    #[test]
    fn stringifies_each_cell_kind() {
        assert_eq!(value_to_string(&SqlValue::Null, "(null)"), "(null)");
        assert_eq!(value_to_string(&SqlValue::Float(1.5), ""), "1.5");
        assert_eq!(value_to_string(&SqlValue::Blob(b"plain".to_vec()), ""), "plain");
        assert_eq!(value_to_string(&SqlValue::Blob(vec![0xff, 0x00, 0x01]), ""), "/wAB");
        let midnight = datetime!(2024-03-01 00:00:00 UTC);
        assert_eq!(value_to_string(&SqlValue::Timestamp(midnight), ""), "2024-03-01");
        let afternoon = datetime!(2024-03-01 15:04:05 +02:00);
        assert_eq!(value_to_string(&SqlValue::Timestamp(afternoon), ""), "2024-03-01T13:04:05Z");
    }

    #[test]
    fn csv_has_header_and_plain_rows() {
        let csv = to_csv(&fruit()).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap(), "id,value\n1,apple\n2,pear\n");
        assert!(to_csv(&QueryResult::default()).unwrap().is_empty());
    }

    #[test]
    fn csv_quotes_when_needed_and_blanks_nulls() {
        let result = QueryResult::new(
            vec!["note".to_string(), "n".to_string()],
            vec![vec![SqlValue::from("a,b"), SqlValue::Null]],
        );
        let csv = String::from_utf8(to_csv(&result).unwrap()).unwrap();
        assert_eq!(csv, "note,n\n\"a,b\",\n");
    }

    #[test]
    fn json_lines_are_independent_objects() {
        let lines: Vec<String> = json_lines(fruit())
            .map(|line| String::from_utf8(line.unwrap()).unwrap())
            .collect();
        assert_eq!(lines, vec![
            "{\"id\":1,\"value\":\"apple\"}\n".to_string(),
            "{\"id\":2,\"value\":\"pear\"}\n".to_string(),
        ]);
    }

    #[test]
    fn json_values_keep_types() {
        assert_eq!(json_value(&SqlValue::Float(f64::NAN)), Value::Null);
        assert_eq!(json_value(&SqlValue::Blob(b"text".to_vec())), Value::String("text".to_string()));
        assert_eq!(json_value(&SqlValue::Blob(vec![0xff])), Value::String("/w==".to_string()));
        assert_eq!(
            json_value(&SqlValue::Timestamp(datetime!(2024-03-01 00:00:00 UTC))),
            Value::String("2024-03-01T00:00:00Z".to_string())
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            RewriteRule::new()
                .value(Regex::new("apple").unwrap())
                .apply(|_, s, _| Some(DisplayValue::Markup(format!("<b>{s}</b>")))),
            RewriteRule::new()
                .value(Regex::new("a").unwrap())
                .apply(|_, s, _| Some(DisplayValue::Text(s.to_uppercase()))),
        ];
        let display = to_display(&fruit(), "(null)", &rules);
        assert_eq!(display.rows[0][1], DisplayValue::Markup("<b>apple</b>".to_string()));
        assert_eq!(display.rows[1][1], DisplayValue::Text("PEAR".to_string()));
        assert_eq!(display.rows[0][0], DisplayValue::Text("1".to_string()));
    }

    #[test]
    fn declining_rule_falls_through() {
        let rules = vec![
            RewriteRule::new().column(Regex::new("^value$").unwrap()).apply(|_, _, _| None),
            RewriteRule::new()
                .column(Regex::new("^value$").unwrap())
                .apply(|column, s, _| Some(DisplayValue::Text(format!("{column}={s}")))),
        ];
        let display = to_display(&fruit(), "(null)", &rules);
        assert_eq!(display.rows[0][1], DisplayValue::Text("value=apple".to_string()));
        assert_eq!(display.rows[0][0], DisplayValue::Text("1".to_string()));
    }

    #[test]
    fn value_groups_reach_the_callback() {
        let rule = RewriteRule::new()
            .value(Regex::new(r"^(\w+)@(\w+)?").unwrap())
            .apply(|_, _, groups| Some(DisplayValue::Text(groups.join("|"))));
        assert_eq!(rule.check_apply("c", "me@"), Some(DisplayValue::Text("me@|me|".to_string())));
        assert_eq!(rule.check_apply("c", "nobody"), None);
    }

    #[test]
    fn text_cells_are_escaped_and_markup_is_not() {
        assert_eq!(DisplayValue::Text("<a&'\">".to_string()).to_html(), "&lt;a&amp;&#39;&#34;&gt;");
        assert_eq!(DisplayValue::Markup("<b>x</b>".to_string()).to_html(), "<b>x</b>");
    }

    #[test]
    fn elapsed_is_rounded_for_display() {
        let mut result = fruit();
        result.elapsed = Duration::from_micros(1_249);
        assert_eq!(to_display(&result, "", &[]).elapsed, Duration::from_micros(1_200));
    }
}
