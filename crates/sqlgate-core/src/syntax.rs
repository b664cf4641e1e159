// crates/sqlgate-core/src/syntax.rs
// ============================================================================
// Module: Syntax Guard
// Description: Lexical screening of caller-supplied SQL.
// Purpose: Block connection-level escape hatches regardless of open flags.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A read-only connection can still be told to `ATTACH` another file, so the
//! guard works on tokens rather than trusting the backing store. The lexer
//! skips quoted literals and identifiers, line comments, and block comments,
//! then rejects any remaining word in [`FORBIDDEN_KEYWORDS`] regardless of case.
//! Security posture: query text is untrusted input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::QueryError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum query length in bytes.
pub const DEFAULT_MAX_QUERY_BYTES: usize = 4000;
/// Keywords that may not appear outside literals and comments.
pub const FORBIDDEN_KEYWORDS: [&str; 4] = ["ATTACH", "DETACH", "TEMP", "TEMPORARY"];

// ============================================================================
// SECTION: Guards
// ============================================================================

/// Rejects `sql` when it exceeds `max_bytes`.
///
/// # Errors
///
/// Returns [`QueryError::Rejected`] when the text is too long.
pub fn check_length(sql: &str, max_bytes: usize) -> Result<(), QueryError> {
    if sql.len() > max_bytes {
        return Err(QueryError::Rejected(format!(
            "query too long: {} bytes (max {max_bytes})",
            sql.len()
        )));
    }
    Ok(())
}

/// Rejects `sql` when it contains a forbidden keyword outside literals and
/// comments, or an unterminated literal.
///
/// # Errors
///
/// Returns [`QueryError::Rejected`] describing the first violation.
pub fn check_syntax(sql: &str) -> Result<(), QueryError> {
    for word in words(sql)? {
        let upper = word.to_ascii_uppercase();
        if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
            return Err(QueryError::Rejected(format!("statement may not contain {upper}")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Splits `sql` into bare words, skipping literals and comments.
fn words(sql: &str) -> Result<Vec<&str>, QueryError> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let byte = bytes[pos];
        match byte {
            b'\'' | b'"' | b'`' => pos = skip_quoted(bytes, pos, byte)?,
            b'[' => pos = skip_quoted(bytes, pos, b']')?,
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                let rest = &bytes[pos ..];
                pos = rest.iter().position(|b| *b == b'\n').map_or(bytes.len(), |n| pos + n);
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = sql[pos + 2 ..].find("*/").map_or(bytes.len(), |n| pos + 2 + n + 2);
            }
            _ if is_word_byte(byte) => {
                let start = pos;
                while pos < bytes.len() && is_word_byte(bytes[pos]) {
                    pos += 1;
                }
                words.push(&sql[start .. pos]);
            }
            _ => pos += 1,
        }
    }
    Ok(words)
}

/// Returns the position just past the literal opened at `start`. A doubled
/// closing quote is an escaped quote.
fn skip_quoted(bytes: &[u8], start: usize, close: u8) -> Result<usize, QueryError> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == close {
            if close != b']' && bytes.get(pos + 1) == Some(&close) {
                pos += 2;
                continue;
            }
            return Ok(pos + 1);
        }
        pos += 1;
    }
    Err(QueryError::Rejected("unterminated quoted literal".to_string()))
}

/// Word bytes: ASCII alphanumerics, underscore, and any non-ASCII byte.
const fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
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

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn rejects_attach_statement() {
        assert!(check_syntax(r#"ATTACH DATABASE "x" AS y;"#).is_err());
    }

    #[test]
    fn accepts_keyword_inside_string_literal() {
        check_syntax("SELECT 'ATTACH DATABASE is a string';").unwrap();
    }

    #[test]
    fn accepts_keyword_inside_leading_comment() {
        check_syntax("-- attach database\nSELECT 1").unwrap();
    }

    #[test]
    fn rejects_mixed_case_keyword_between_comments() {
        let sql = "/* hide */ AtTaCh -- nothing here\n DATABASE 'x' /* more */ AS y";
        assert!(check_syntax(sql).is_err());
    }

    #[test]
    fn rejects_keyword_adjacent_to_punctuation() {
        assert!(check_syntax("SELECT 1;DETACH y").is_err());
        assert!(check_syntax("CREATE TEMP TABLE t(x)").is_err());
        assert!(check_syntax("create temporary view v as select 1").is_err());
    }

    #[test]
    fn accepts_keyword_as_part_of_identifier() {
        check_syntax("SELECT attached, temperature FROM t").unwrap();
        check_syntax(r#"SELECT "attach" FROM [detach]"#).unwrap();
    }

    #[test]
    fn escaped_quotes_do_not_end_literal() {
        check_syntax("SELECT 'it''s ATTACH'").unwrap();
        assert!(check_syntax("SELECT 'it''s' ATTACH").is_err());
    }

    #[test]
    fn rejects_unterminated_literal() {
        assert!(check_syntax("SELECT 'oops ATTACH").is_err());
    }

    #[test]
    fn length_guard_enforces_budget() {
        check_length(&"x".repeat(DEFAULT_MAX_QUERY_BYTES), DEFAULT_MAX_QUERY_BYTES).unwrap();
        let err =
            check_length(&"x".repeat(DEFAULT_MAX_QUERY_BYTES + 1), DEFAULT_MAX_QUERY_BYTES)
                .unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)));
    }

    proptest! {
        #[test]
        fn forbidden_keyword_is_rejected_in_any_case(
            index in 0usize .. FORBIDDEN_KEYWORDS.len(),
            mask in any::<u16>(),
            prefix in "[a-z ]{0,12}",
        ) {
            let keyword: String = FORBIDDEN_KEYWORDS[index]
                .chars()
                .enumerate()
                .map(|(i, c)| if mask & (1 << i) == 0 { c.to_ascii_lowercase() } else { c })
                .collect();
            let sql = format!("{prefix} /* c */ {keyword} -- tail\n x");
            prop_assert!(check_syntax(&sql).is_err());
        }

        #[test]
        fn quoted_keywords_are_always_accepted(
            index in 0usize .. FORBIDDEN_KEYWORDS.len(),
            filler in "[a-z ]{0,12}",
        ) {
            let sql = format!("SELECT '{filler} {}' , \"{}\"", FORBIDDEN_KEYWORDS[index], filler);
            prop_assert!(check_syntax(&sql).is_ok());
        }
    }
}
