//! Configuration for the document store
//!
//! Provides builders for the driver-level [`StoreConfig`] and the
//! per-table [`FactoryConfig`].

use crate::error::{Result, StoreError};
use crate::sql::dialect::Backend;

/// Default name of the schema history table
pub const DEFAULT_SCHEMA_TABLE: &str = "document_schema";

/// Default path of the document identifier
pub const DEFAULT_ID_PATH: &str = "dso.id";

/// Default path of the soft-delete timestamp
pub const DEFAULT_DELETED_PATH: &str = "dso.deleted";

/// Characters new identifiers are drawn from
pub const DEFAULT_ID_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

pub const DEFAULT_ID_LENGTH: usize = 8;

/// How many candidates to draw before giving up on a rejected identifier
pub const DEFAULT_ID_MAX_ATTEMPTS: u32 = 10;

/// Configuration for a storage driver
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database URL (`postgres://`, `mysql://` or `sqlite:`)
    pub database_url: String,
    /// Name of the schema history table (default: "document_schema")
    pub schema_table: String,
    /// Backend override; detected from the URL when `None`
    pub backend: Option<Backend>,
    /// Path used as the row key when a schema declares no primary column
    pub id_path: String,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }

    /// The configured backend, or the one the URL scheme names
    pub fn resolve_backend(&self) -> Result<Backend> {
        match self.backend {
            Some(backend) => Ok(backend),
            None => Backend::from_url(&self.database_url),
        }
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    schema_table: String,
    backend: Option<Backend>,
    id_path: String,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            schema_table: DEFAULT_SCHEMA_TABLE.to_string(),
            backend: None,
            id_path: DEFAULT_ID_PATH.to_string(),
        }
    }

    /// Set the schema history table name (default: "document_schema")
    pub fn schema_table(mut self, name: impl Into<String>) -> Self {
        self.schema_table = name.into();
        self
    }

    /// Force a backend instead of detecting it from the URL
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the fallback row-key path (default: "dso.id")
    pub fn id_path(mut self, path: impl Into<String>) -> Self {
        self.id_path = path.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            schema_table: self.schema_table,
            backend: self.backend,
            id_path: self.id_path,
        }
    }
}

/// Configuration for a factory bound to one document table
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub table: String,
    /// Where the document identifier lives (default: "dso.id")
    pub id_path: String,
    /// Where the soft-delete timestamp lives (default: "dso.deleted")
    pub deleted_path: String,
    pub id_alphabet: String,
    pub id_length: usize,
    pub id_max_attempts: u32,
}

impl FactoryConfig {
    pub fn builder(table: impl Into<String>) -> FactoryConfigBuilder {
        FactoryConfigBuilder::new(table)
    }

    /// Check the settings that end up in SQL text or identifier generation
    pub fn validate(&self) -> Result<()> {
        crate::sql::sanitize::validate_identifier(&self.table, &[])
            .map_err(StoreError::Validation)?;
        crate::sql::sanitize::json_path_segments(&self.id_path)?;
        crate::sql::sanitize::json_path_segments(&self.deleted_path)?;
        if self.id_alphabet.is_empty() || self.id_length == 0 {
            return Err(StoreError::validation(
                "Identifier alphabet and length must be non-empty",
            ));
        }
        if self.id_max_attempts == 0 {
            return Err(StoreError::validation(
                "Identifier generation needs at least one attempt",
            ));
        }
        Ok(())
    }
}

/// Builder for FactoryConfig
#[derive(Debug)]
pub struct FactoryConfigBuilder {
    config: FactoryConfig,
}

impl FactoryConfigBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            config: FactoryConfig {
                table: table.into(),
                id_path: DEFAULT_ID_PATH.to_string(),
                deleted_path: DEFAULT_DELETED_PATH.to_string(),
                id_alphabet: DEFAULT_ID_ALPHABET.to_string(),
                id_length: DEFAULT_ID_LENGTH,
                id_max_attempts: DEFAULT_ID_MAX_ATTEMPTS,
            },
        }
    }

    pub fn id_path(mut self, path: impl Into<String>) -> Self {
        self.config.id_path = path.into();
        self
    }

    pub fn deleted_path(mut self, path: impl Into<String>) -> Self {
        self.config.deleted_path = path.into();
        self
    }

    pub fn id_alphabet(mut self, alphabet: impl Into<String>) -> Self {
        self.config.id_alphabet = alphabet.into();
        self
    }

    pub fn id_length(mut self, length: usize) -> Self {
        self.config.id_length = length;
        self
    }

    pub fn id_max_attempts(mut self, attempts: u32) -> Self {
        self.config.id_max_attempts = attempts;
        self
    }

    pub fn build(self) -> FactoryConfig {
        self.config
    }
}
