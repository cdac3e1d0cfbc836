//! Backend dialects
//!
//! A [`Dialect`] knows how one SQL engine quotes identifiers, numbers its
//! placeholders, extracts values out of the JSON data column and declares
//! virtual columns. Engines that can keep a generated column in sync with the
//! document ([`Projection::Generated`]) and engines where the driver has to
//! write shadow columns itself ([`Projection::Shadow`]) sit behind the same
//! trait.

use std::fmt;

use crate::error::{Result, StoreError};
use crate::sql::DATA_COLUMN;
use crate::sql::sanitize::{quote_identifier, quote_identifier_backtick};
use crate::types::{ColumnDescriptor, IndexPlan};

/// Supported SQL engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Postgres,
    MySql,
    Sqlite,
}

impl Backend {
    /// Detect the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(StoreError::UnsupportedBackend(url.to_string())),
        }
    }

    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Postgres => Box::new(PostgresDialect),
            Self::MySql => Box::new(MySqlDialect),
            Self::Sqlite => Box::new(SqliteDialect),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::MySql => write!(f, "mysql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// How virtual columns are kept in sync with the JSON document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// The engine computes the column from the document
    Generated,
    /// The driver writes the column alongside the document
    Shadow,
}

/// Name of the index backing a virtual column
pub fn index_name(table: &str, column: &str) -> String {
    format!("{}_{}_idx", table, column)
}

pub trait Dialect: Send + Sync + fmt::Debug {
    fn backend(&self) -> Backend;

    fn projection(&self) -> Projection;

    /// Whether DDL statements participate in transactions
    fn transactional_ddl(&self) -> bool;

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_identifier(identifier)
    }

    /// Positional placeholder for the 1-based parameter `position`
    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    /// Expression reading the scalar at `segments` out of the data column
    ///
    /// Segments must already be validated with
    /// [`json_path_segments`](crate::sql::sanitize::json_path_segments).
    fn json_extract(&self, segments: &[&str]) -> String;

    /// SQL type of the data column
    fn data_column_type(&self) -> &'static str;

    /// Wrap the placeholder that carries the serialized document on write
    fn data_param(&self, placeholder: &str) -> String {
        placeholder.to_string()
    }

    /// Expression reading the data column back as text
    fn data_select(&self) -> String {
        self.quote_identifier(DATA_COLUMN)
    }

    /// Column clause for CREATE TABLE and ADD COLUMN
    fn column_definition(&self, segments: &[&str], column: &ColumnDescriptor) -> String;

    /// Trailing table options for CREATE TABLE
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Index statement for a column, if its index plan needs one
    fn create_index(&self, table: &str, column: &ColumnDescriptor) -> Option<String>;

    fn drop_index(&self, table: &str, column: &ColumnDescriptor) -> String {
        format!(
            "DROP INDEX IF EXISTS {}",
            self.quote_identifier(&index_name(table, &column.name))
        )
    }

    /// Query returning a row when the table named by the first parameter exists
    fn table_exists_query(&self) -> String;

    /// LIMIT/OFFSET clause; `None` when neither is set
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String>;
}

/// JSON path literal body for MySQL and SQLite: `$."a"."b"`
fn dollar_path(segments: &[&str]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        path.push_str(".\"");
        path.push_str(segment);
        path.push('"');
    }
    path
}

fn standard_limit(limit: Option<u64>, offset: Option<u64>) -> Option<String> {
    match (limit, offset) {
        (None, None) => None,
        (Some(limit), None) => Some(format!("LIMIT {}", limit)),
        (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
        (None, Some(offset)) => Some(format!("OFFSET {}", offset)),
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL: JSONB data column, stored generated columns
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn projection(&self) -> Projection {
        Projection::Generated
    }

    fn transactional_ddl(&self) -> bool {
        true
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn json_extract(&self, segments: &[&str]) -> String {
        format!(
            "({} #>> '{{{}}}')",
            self.quote_identifier(DATA_COLUMN),
            segments.join(",")
        )
    }

    fn data_column_type(&self) -> &'static str {
        "JSONB"
    }

    fn data_param(&self, placeholder: &str) -> String {
        format!("CAST({} AS JSONB)", placeholder)
    }

    fn data_select(&self) -> String {
        format!("CAST({} AS TEXT)", self.quote_identifier(DATA_COLUMN))
    }

    fn column_definition(&self, segments: &[&str], column: &ColumnDescriptor) -> String {
        format!(
            "{} {} GENERATED ALWAYS AS (CAST({} AS {})) STORED",
            self.quote_identifier(&column.name),
            column.sql_type,
            self.json_extract(segments),
            column.sql_type
        )
    }

    fn create_index(&self, table: &str, column: &ColumnDescriptor) -> Option<String> {
        let (unique, kind) = match column.index_plan() {
            IndexPlan::Primary => (true, Some("BTREE".to_string())),
            IndexPlan::Unique(kind) => (true, kind),
            IndexPlan::Plain(kind) => (false, Some(kind)),
            IndexPlan::None => return None,
        };
        Some(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {}{} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index_name(table, &column.name)),
            self.quote_identifier(table),
            kind.map(|k| format!(" USING {}", k.to_lowercase()))
                .unwrap_or_default(),
            self.quote_identifier(&column.name)
        ))
    }

    fn table_exists_query(&self) -> String {
        "SELECT 1 FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1"
            .to_string()
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        standard_limit(limit, offset)
    }
}

// ============================================================================
// MySQL / MariaDB
// ============================================================================

/// MySQL and MariaDB: JSON data column, generated columns
///
/// The row-key column is STORED, everything else VIRTUAL.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn projection(&self) -> Projection {
        Projection::Generated
    }

    fn transactional_ddl(&self) -> bool {
        false
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_identifier_backtick(identifier)
    }

    fn json_extract(&self, segments: &[&str]) -> String {
        format!(
            "JSON_UNQUOTE(JSON_EXTRACT({}, '{}'))",
            self.quote_identifier(DATA_COLUMN),
            dollar_path(segments)
        )
    }

    fn data_column_type(&self) -> &'static str {
        "JSON"
    }

    fn data_select(&self) -> String {
        format!("CAST({} AS CHAR)", self.quote_identifier(DATA_COLUMN))
    }

    fn column_definition(&self, segments: &[&str], column: &ColumnDescriptor) -> String {
        format!(
            "{} {} GENERATED ALWAYS AS ({}) {}",
            self.quote_identifier(&column.name),
            column.sql_type,
            self.json_extract(segments),
            if column.primary { "STORED" } else { "VIRTUAL" }
        )
    }

    fn table_options(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    }

    fn create_index(&self, table: &str, column: &ColumnDescriptor) -> Option<String> {
        let (unique, kind) = match column.index_plan() {
            IndexPlan::Primary => (true, Some("BTREE".to_string())),
            IndexPlan::Unique(kind) => (true, kind),
            IndexPlan::Plain(kind) => (false, Some(kind)),
            IndexPlan::None => return None,
        };
        Some(format!(
            "CREATE {}INDEX {} ON {} ({}){}",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index_name(table, &column.name)),
            self.quote_identifier(table),
            self.quote_identifier(&column.name),
            kind.map(|k| format!(" USING {}", k.to_uppercase()))
                .unwrap_or_default()
        ))
    }

    fn drop_index(&self, table: &str, column: &ColumnDescriptor) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(&index_name(table, &column.name)),
            self.quote_identifier(table)
        )
    }

    fn table_exists_query(&self) -> String {
        "SELECT 1 FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ?"
            .to_string()
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            // MySQL has no bare OFFSET
            (None, Some(offset)) => Some(format!("LIMIT {} OFFSET {}", u64::MAX, offset)),
            _ => standard_limit(limit, offset),
        }
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite: TEXT data column, shadow columns written by the driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn projection(&self) -> Projection {
        Projection::Shadow
    }

    fn transactional_ddl(&self) -> bool {
        true
    }

    fn json_extract(&self, segments: &[&str]) -> String {
        format!(
            "json_extract({}, '{}')",
            self.quote_identifier(DATA_COLUMN),
            dollar_path(segments)
        )
    }

    fn data_column_type(&self) -> &'static str {
        "TEXT"
    }

    fn column_definition(&self, _segments: &[&str], column: &ColumnDescriptor) -> String {
        let mut definition = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            column.sql_type
        );
        if column.primary {
            definition.push_str(" PRIMARY KEY");
        }
        definition
    }

    fn create_index(&self, table: &str, column: &ColumnDescriptor) -> Option<String> {
        // SQLite indexes have no access-method clause
        let unique = match column.index_plan() {
            IndexPlan::Primary | IndexPlan::None => return None,
            IndexPlan::Unique(_) => true,
            IndexPlan::Plain(_) => false,
        };
        Some(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index_name(table, &column.name)),
            self.quote_identifier(table),
            self.quote_identifier(&column.name)
        ))
    }

    fn table_exists_query(&self) -> String {
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?".to_string()
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, Some(offset)) => Some(format!("LIMIT -1 OFFSET {}", offset)),
            _ => standard_limit(limit, offset),
        }
    }
}
