//! SQL Identifier Sanitization Utilities
//!
//! Everything that ends up spliced into generated SQL text (identifiers, column
//! types, index kinds, JSON path segments) passes through one of these checks.

use std::sync::LazyLock;

use regex::Regex;

use crate::document::path_segments;
use crate::error::{Result, StoreError};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier pattern"));

static SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*( [A-Za-z][A-Za-z0-9_]*)*( ?\(\d+( ?, ?\d+)?\))?$")
        .expect("sql type pattern")
});

static INDEX_KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("index kind pattern"));

static PATH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("path segment pattern"));

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ANALYSE",
    "ANALYZE",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASYMMETRIC",
    "BOTH",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CURRENT_CATALOG",
    "CURRENT_DATE",
    "CURRENT_ROLE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "DEFAULT",
    "DEFERRABLE",
    "DESC",
    "DISTINCT",
    "DO",
    "ELSE",
    "END",
    "EXCEPT",
    "FALSE",
    "FETCH",
    "FOR",
    "FOREIGN",
    "FROM",
    "GRANT",
    "GROUP",
    "HAVING",
    "IN",
    "INITIALLY",
    "INTERSECT",
    "INTO",
    "LATERAL",
    "LEADING",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "ONLY",
    "OR",
    "ORDER",
    "PLACING",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SESSION_USER",
    "SOME",
    "SYMMETRIC",
    "TABLE",
    "THEN",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNIQUE",
    "USER",
    "USING",
    "VARIADIC",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

/// Quote a SQL identifier with double quotes (PostgreSQL and SQLite)
///
/// # Example
/// ```
/// use runtara_document_store::sql::quote_identifier;
///
/// let quoted = quote_identifier("my_table");
/// assert_eq!(quoted, "\"my_table\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    // Escape any double quotes in the identifier by doubling them
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote a SQL identifier with backticks (MySQL)
pub fn quote_identifier_backtick(identifier: &str) -> String {
    let escaped = identifier.replace('`', "``");
    format!("`{}`", escaped)
}

/// Validate a table or column name
///
/// Rules:
/// - Must start with a letter (a-z)
/// - Can only contain lowercase letters, numbers, and underscores
/// - Cannot be a PostgreSQL reserved word
/// - Cannot be one of `reserved_columns` (e.g. the JSON data column)
///
/// # Example
/// ```
/// use runtara_document_store::sql::validate_identifier;
///
/// assert!(validate_identifier("documents", &[]).is_ok());
/// assert!(validate_identifier("select", &[]).is_err()); // reserved keyword
/// assert!(validate_identifier("json_data", &["json_data"]).is_err()); // reserved column
/// ```
pub fn validate_identifier(name: &str, reserved_columns: &[&str]) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if !IDENTIFIER.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    if reserved_columns.contains(&name) {
        return Err(format!(
            "Column name '{}' is reserved and cannot be used.",
            name
        ));
    }

    Ok(())
}

/// Validate a column SQL type such as `VARCHAR(16)`, `BIGINT` or `NUMERIC(10,2)`
pub fn validate_sql_type(sql_type: &str) -> std::result::Result<(), String> {
    if SQL_TYPE.is_match(sql_type) {
        Ok(())
    } else {
        Err(format!("Column type '{}' is not a plain SQL type", sql_type))
    }
}

/// Validate an index kind such as `BTREE` or `HASH`
pub fn validate_index_kind(kind: &str) -> std::result::Result<(), String> {
    if INDEX_KIND.is_match(kind) {
        Ok(())
    } else {
        Err(format!("Index kind '{}' is invalid", kind))
    }
}

/// Split a document path into segments that are safe to embed in a JSON path literal
///
/// Fails with [`StoreError::InvalidPath`] for malformed or empty paths and for
/// segments containing anything other than letters, digits, `_` and `-`.
pub fn json_path_segments(path: &str) -> Result<Vec<&str>> {
    match path_segments(path) {
        Some(segments)
            if !segments.is_empty() && segments.iter().all(|s| PATH_SEGMENT.is_match(s)) =>
        {
            Ok(segments)
        }
        _ => Err(StoreError::invalid_path(path)),
    }
}
