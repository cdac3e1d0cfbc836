//! SQL utilities for the document store
//!
//! Provides dialects, statement generation, placeholder expansion and
//! identifier sanitization.

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expand;
pub mod sanitize;

/// Name of the column holding the serialized document in every document table
pub const DATA_COLUMN: &str = "json_data";

pub use ddl::DdlGenerator;
pub use dialect::{Backend, Dialect, MySqlDialect, PostgresDialect, Projection, SqliteDialect};
pub use dml::DmlGenerator;
pub use expand::{BoundStatement, bind_named, expand_paths};
pub use sanitize::{
    POSTGRES_RESERVED_WORDS, json_path_segments, quote_identifier, validate_identifier,
};
