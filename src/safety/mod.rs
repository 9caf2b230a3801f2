//! Query Safety Gate
//!
//! Every user-supplied statement passes through two independent checks before
//! it reaches a connection:
//!
//! 1. **Read-only validation** via a [`SafetyPolicy`]. The shipped policy,
//!    [`KeywordDenylist`], strips comments from a copy of the statement and
//!    rejects any whole-word occurrence of a denylisted keyword. It is a
//!    heuristic, not a parser: a keyword inside a string literal
//!    (`WHERE Description = 'please delete'`) is rejected as well.
//! 2. **Row-limit injection** via [`inject_row_limit`], which inserts `TOP N`
//!    after the outermost `SELECT` unless the statement already has one.
//!
//! The original statement text is what gets executed; comment stripping only
//! ever happens on a private copy.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, ScoutError};

/// Keywords that mark a statement as mutating or privileged
pub const DENYLIST: [&str; 12] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "EXEC", "EXECUTE",
    "GRANT", "REVOKE", "MERGE",
];

/// Row cap applied when the caller does not ask for one
pub const DEFAULT_MAX_ROWS: usize = 500;

/// Hard ceiling for any requested row cap
pub const ABSOLUTE_MAX_ROWS: usize = 10_000;

static DENYLIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DENYLIST.join("|"))).unwrap()
});
/// Quoted regions and comments, matched left to right so that a `--` or `/*`
/// inside a literal is never taken for a comment opener (and vice versa).
/// Unterminated quotes run to the end of the text.
static LEXEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)'(?:[^']|'')*(?:'|\z)",
        r#"|"(?:[^"]|"")*(?:"|\z)"#,
        r"|\[(?:[^\]]|\]\])*(?:\]|\z)",
        r"|--[^\n]*",
        r"|/\*.*?\*/",
    ))
    .unwrap()
});
static EXPLICIT_TOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTOP\s+\d+\b|\bTOP\s*\(\s*\d+\s*\)").unwrap());
static LEADING_WITH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*WITH\b").unwrap());
static LEADING_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*SELECT\b").unwrap());
static SELECT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSELECT\b").unwrap());
static SET_QUANTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s+(DISTINCT|ALL)\b").unwrap());

/// Decides whether a statement may be sent to the database.
///
/// Callers depend on this trait rather than on [`KeywordDenylist`] so a
/// parser-backed allow-list can replace it without touching them.
pub trait SafetyPolicy: Send + Sync {
    /// Return `Ok(())` if the statement is read-only, `UnsafeQuery` otherwise
    fn validate(&self, sql: &str) -> Result<()>;
}

/// Word-boundary keyword denylist applied to the comment-stripped statement
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDenylist;

impl SafetyPolicy for KeywordDenylist {
    fn validate(&self, sql: &str) -> Result<()> {
        let cleaned = strip_comments(sql);
        match DENYLIST_PATTERN.find(&cleaned) {
            Some(m) => Err(ScoutError::unsafe_query(m.as_str().to_uppercase())),
            None => Ok(()),
        }
    }
}

/// Remove `--` line comments and `/* */` block comments.
///
/// One left-to-right scan: string literals and quoted identifiers are kept
/// verbatim and comment markers inside them are ignored. Block comments do not
/// nest. An unterminated `/*` is left in place so the text after it is still
/// scanned.
#[must_use]
pub fn strip_comments(sql: &str) -> String {
    rewrite_lexemes(sql, |lexeme| {
        if is_comment(lexeme) {
            String::new()
        } else {
            lexeme.to_string()
        }
    })
}

/// Replace every comment and quoted region with spaces, keeping byte offsets
/// stable. Used to locate keywords for the row-limit rewrite.
fn mask_lexemes(sql: &str) -> String {
    rewrite_lexemes(sql, |lexeme| " ".repeat(lexeme.len()))
}

fn is_comment(lexeme: &str) -> bool {
    lexeme.starts_with("--") || lexeme.starts_with("/*")
}

fn rewrite_lexemes(sql: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for m in LEXEME.find_iter(sql) {
        out.push_str(&sql[last..m.start()]);
        out.push_str(&rewrite(m.as_str()));
        last = m.end();
    }
    out.push_str(&sql[last..]);
    out
}

/// Clamp a requested row cap to `1..=absolute_max`
#[must_use]
pub fn clamp_row_cap(requested: usize, absolute_max: usize) -> usize {
    requested.clamp(1, absolute_max.max(1))
}

/// Insert `TOP {max_rows}` after the outermost `SELECT`.
///
/// - Statements that already carry `TOP n` / `TOP (n)` are returned unchanged
///   (an identifier such as `Top10Flag` is not a `TOP` clause),
///   which makes the rewrite idempotent.
/// - `WITH ...` statements are capped at the last `SELECT` in the text, the
///   outer select that follows the CTE bodies.
/// - `SELECT DISTINCT` / `SELECT ALL` get the cap after the set quantifier.
/// - Anything without a leading `SELECT` (or `WITH ... SELECT`) is returned
///   unchanged and left for the database to accept or reject.
///
/// Keywords inside comments, string literals and quoted identifiers are
/// ignored when locating the insertion point.
#[must_use]
pub fn inject_row_limit(sql: &str, max_rows: usize) -> String {
    let masked = mask_lexemes(sql);

    if EXPLICIT_TOP.is_match(&masked) {
        return sql.to_string();
    }

    let anchor = if LEADING_WITH.is_match(&masked) {
        SELECT_KEYWORD.find_iter(&masked).last().map(|m| m.end())
    } else {
        LEADING_SELECT.find(&masked).map(|m| m.end())
    };

    let Some(mut pos) = anchor else {
        return sql.to_string();
    };

    if let Some(quantifier) = SET_QUANTIFIER.find(&masked[pos..]) {
        pos += quantifier.end();
    }

    format!("{} TOP {max_rows}{}", &sql[..pos], &sql[pos..])
}
