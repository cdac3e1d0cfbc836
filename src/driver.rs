//! Storage driver abstraction
//!
//! A [`Driver`] owns one database connection and knows how to store,
//! search and reconcile document tables on it. [`Factory`](crate::Factory)
//! is generic over the driver so tests can substitute a recording one.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::dso::ChangeTracker;
use crate::error::Result;
use crate::schema::{ReconcileReport, SchemaVersion};
use crate::search::{Params, Search};
use crate::sql::sanitize::quote_identifier;
use crate::types::Schema;

pub trait Driver: Send + Sync {
    /// Quote a column or table name for use in search fragments
    fn quote_identifier(&self, identifier: &str) -> String {
        quote_identifier(identifier)
    }

    fn table_exists(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Create the schema history table if it does not exist
    fn create_schema_table(&self) -> impl Future<Output = Result<()>> + Send;

    /// Create a document table with its virtual columns and indexes and
    /// record its schema; a no-op returning `true` when it already exists
    fn create_table(&self, table: &str, schema: &Schema) -> impl Future<Output = Result<bool>> + Send;

    /// Append a schema revision for `table`
    fn save_schema(&self, table: &str, schema: &Schema) -> impl Future<Output = Result<()>> + Send;

    /// Latest persisted schema for `table`
    fn get_schema(&self, table: &str) -> impl Future<Output = Result<Option<Schema>>> + Send;

    /// Every persisted schema revision for `table`, oldest first
    fn schema_history(&self, table: &str) -> impl Future<Output = Result<Vec<SchemaVersion>>> + Send;

    /// Create the schema table and document table, atomically where the
    /// backend allows
    fn prepare_environment(
        &self,
        table: &str,
        schema: &Schema,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Whether the table exists with exactly `schema` persisted
    fn check_environment(
        &self,
        table: &str,
        schema: &Schema,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Bring the table in line with `schema`
    fn update_environment(
        &self,
        table: &str,
        schema: &Schema,
    ) -> impl Future<Output = Result<ReconcileReport>> + Send;

    /// Raw documents matching a search whose fragments are already expanded
    /// against the schema
    fn select(
        &self,
        table: &str,
        search: &Search,
        params: &Params,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    fn count(
        &self,
        table: &str,
        search: &Search,
        params: &Params,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// `Ok(false)` when a row with the same key already exists
    fn insert(&self, table: &str, doc: &ChangeTracker) -> impl Future<Output = Result<bool>> + Send;

    /// `Ok(false)` when no row matched the document's key
    fn update(&self, table: &str, doc: &ChangeTracker) -> impl Future<Output = Result<bool>> + Send;

    /// `Ok(false)` when no row matched the document's key
    fn delete(&self, table: &str, doc: &ChangeTracker) -> impl Future<Output = Result<bool>> + Send;

    fn begin_transaction(&self) -> impl Future<Output = Result<()>> + Send;

    fn commit(&self) -> impl Future<Output = Result<()>> + Send;

    fn roll_back(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Lets several factories share one driver (and so one connection)
impl<T: Driver> Driver for Arc<T> {
    fn quote_identifier(&self, identifier: &str) -> String {
        (**self).quote_identifier(identifier)
    }

    fn table_exists(&self, table: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).table_exists(table)
    }

    fn create_schema_table(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).create_schema_table()
    }

    fn create_table(&self, table: &str, schema: &Schema) -> impl Future<Output = Result<bool>> + Send {
        (**self).create_table(table, schema)
    }

    fn save_schema(&self, table: &str, schema: &Schema) -> impl Future<Output = Result<()>> + Send {
        (**self).save_schema(table, schema)
    }

    fn get_schema(&self, table: &str) -> impl Future<Output = Result<Option<Schema>>> + Send {
        (**self).get_schema(table)
    }

    fn schema_history(&self, table: &str) -> impl Future<Output = Result<Vec<SchemaVersion>>> + Send {
        (**self).schema_history(table)
    }

    fn prepare_environment(
        &self,
        table: &str,
        schema: &Schema,
    ) -> impl Future<Output = Result<bool>> + Send {
        (**self).prepare_environment(table, schema)
    }

    fn check_environment(
        &self,
        table: &str,
        schema: &Schema,
    ) -> impl Future<Output = Result<bool>> + Send {
        (**self).check_environment(table, schema)
    }

    fn update_environment(
        &self,
        table: &str,
        schema: &Schema,
    ) -> impl Future<Output = Result<ReconcileReport>> + Send {
        (**self).update_environment(table, schema)
    }

    fn select(
        &self,
        table: &str,
        search: &Search,
        params: &Params,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send {
        (**self).select(table, search, params)
    }

    fn count(
        &self,
        table: &str,
        search: &Search,
        params: &Params,
    ) -> impl Future<Output = Result<i64>> + Send {
        (**self).count(table, search, params)
    }

    fn insert(&self, table: &str, doc: &ChangeTracker) -> impl Future<Output = Result<bool>> + Send {
        (**self).insert(table, doc)
    }

    fn update(&self, table: &str, doc: &ChangeTracker) -> impl Future<Output = Result<bool>> + Send {
        (**self).update(table, doc)
    }

    fn delete(&self, table: &str, doc: &ChangeTracker) -> impl Future<Output = Result<bool>> + Send {
        (**self).delete(table, doc)
    }

    fn begin_transaction(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).begin_transaction()
    }

    fn commit(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).commit()
    }

    fn roll_back(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).roll_back()
    }
}
