//! SqlDriver - SQL-backed storage for document tables
//!
//! One driver holds one connection (PostgreSQL, MySQL/MariaDB or SQLite
//! through sqlx's `Any` driver) and a dialect describing that engine.
//! Documents are stored whole in a JSON data column; schema-declared paths
//! are projected into virtual columns so they can be indexed and searched.

use std::collections::HashMap;
use std::sync::PoisonError;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::{Any, AnyConnection, Connection, Executor, Row};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::driver::Driver;
use crate::dso::ChangeTracker;
use crate::error::{Result, StoreError};
use crate::schema::{ReconcileReport, ReconcileStep, SchemaDiff, SchemaVersion};
use crate::search::{Params, Search};
use crate::sql::ddl::DdlGenerator;
use crate::sql::dialect::{Backend, Dialect, Projection};
use crate::sql::dml::DmlGenerator;
use crate::sql::expand::bind_named;
use crate::sql::sanitize::validate_identifier;
use crate::types::Schema;

type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

/// SQL storage driver
///
/// Statements run one at a time on a single connection; transactions are
/// plain `BEGIN`/`COMMIT`/`ROLLBACK` on that connection. The latest
/// persisted schema per table is cached for the lifetime of the driver and
/// refreshed whenever this driver saves a schema.
pub struct SqlDriver {
    conn: Mutex<AnyConnection>,
    dialect: Box<dyn Dialect>,
    config: StoreConfig,
    schemas: std::sync::Mutex<HashMap<String, Option<Schema>>>,
}

impl SqlDriver {
    /// Connect using the configured URL
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("Database connection failed: {}", e)))?;
        Self::from_connection(conn, config)
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: AnyConnection, config: StoreConfig) -> Result<Self> {
        let backend = config.resolve_backend()?;
        validate_identifier(&config.schema_table, &[]).map_err(StoreError::Validation)?;
        info!(backend = %backend, schema_table = %config.schema_table, "Document store driver ready");
        Ok(Self {
            conn: Mutex::new(conn),
            dialect: backend.dialect(),
            config,
            schemas: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.dialect.backend()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Exclusive access to the underlying connection
    pub async fn connection(&self) -> MutexGuard<'_, AnyConnection> {
        self.conn.lock().await
    }

    // =========================================================================
    // Statement Execution
    // =========================================================================

    /// Run a statement without parameters
    async fn execute(&self, sql: &str) -> Result<()> {
        debug!(sql, "Executing statement");
        let mut conn = self.conn.lock().await;
        (&mut *conn)
            .execute(sql)
            .await
            .map_err(|e| StoreError::statement(sql, e))?;
        Ok(())
    }

    async fn execute_bound(&self, sql: &str, values: &[Value]) -> Result<u64> {
        debug!(sql, params = values.len(), "Executing statement");
        let query = values.iter().fold(sqlx::query(sql), bind_json);
        let mut conn = self.conn.lock().await;
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::statement(sql, e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_bound(&self, sql: &str, values: &[Value]) -> Result<Vec<AnyRow>> {
        debug!(sql, params = values.len(), "Fetching rows");
        let query = values.iter().fold(sqlx::query(sql), bind_json);
        let mut conn = self.conn.lock().await;
        query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StoreError::statement(sql, e))
    }

    fn ddl(&self) -> DdlGenerator<'_> {
        DdlGenerator::new(self.dialect.as_ref())
    }

    fn dml(&self) -> DmlGenerator<'_> {
        DmlGenerator::new(self.dialect.as_ref())
    }

    // =========================================================================
    // Schema Cache
    // =========================================================================

    fn cached_schema(&self, table: &str) -> Option<Option<Schema>> {
        self.schemas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    fn cache_schema(&self, table: &str, schema: Option<Schema>) {
        self.schemas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string(), schema);
    }

    fn forget_schema(&self, table: &str) {
        self.schemas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table);
    }

    /// Persisted schema, or an empty one for tables without history
    async fn table_schema(&self, table: &str) -> Result<Schema> {
        Ok(self.get_schema(table).await?.unwrap_or_default())
    }

    // =========================================================================
    // Row Helpers
    // =========================================================================

    /// Key expression and value identifying the document's row
    ///
    /// Uses the schema's primary column, falling back to the configured id
    /// path read straight out of the data column.
    fn row_key(&self, schema: &Schema, doc: &ChangeTracker) -> Result<(String, Value)> {
        let (path, expression) = match schema.primary() {
            Some((path, column)) => (
                path.to_string(),
                self.dialect.quote_identifier(&column.name),
            ),
            None => (
                self.config.id_path.clone(),
                self.dml().path_expression(&self.config.id_path)?,
            ),
        };
        match doc.get(&path) {
            Some(value) if !value.is_null() => Ok((expression, value.clone())),
            _ => Err(StoreError::validation(format!(
                "Document has no value at key path '{}'",
                path
            ))),
        }
    }

    /// Shadow column names and their values for a document; empty when the
    /// engine maintains the columns itself
    fn shadow_values<'s>(&self, schema: &'s Schema, doc: &ChangeTracker) -> Vec<(&'s str, Value)> {
        if self.dialect.projection() != Projection::Shadow {
            return Vec::new();
        }
        schema
            .iter()
            .map(|(path, column)| {
                (
                    column.name.as_str(),
                    doc.get(path).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    // =========================================================================
    // Reconciliation Steps
    // =========================================================================

    async fn remove_columns(&self, table: &str, removed: &Schema) -> Result<()> {
        for (_, column) in removed.iter() {
            for sql in self.ddl().generate_remove_column(table, column) {
                self.execute(&sql).await?;
            }
        }
        Ok(())
    }

    async fn add_columns(&self, table: &str, added: &Schema) -> Result<()> {
        for (path, column) in added.iter() {
            self.execute(&self.ddl().generate_add_column(table, path, column)?)
                .await?;
        }
        Ok(())
    }

    async fn build_indexes(&self, table: &str, schema: &Schema) -> Result<()> {
        for (_, column) in schema.iter() {
            if let Some(sql) = self.ddl().generate_create_index(table, column) {
                self.execute(&sql).await?;
            }
        }
        Ok(())
    }

    /// Recreate a shadow-column table under `schema`, re-deriving every
    /// column from the stored documents
    async fn rebuild_table(&self, table: &str, schema: &Schema) -> Result<()> {
        let scratch = format!("{}_rebuild_{}", table, scratch_suffix());
        let statements = [
            self.ddl().generate_create_table(&scratch, schema)?,
            self.ddl().generate_copy_documents(table, &scratch, schema)?,
            self.ddl().generate_drop_table(table),
            self.ddl().generate_rename_table(&scratch, table),
        ];

        self.begin_transaction().await?;
        for sql in &statements {
            if let Err(e) = self.execute(sql).await {
                if let Err(rollback) = self.roll_back().await {
                    warn!(table, error = %rollback, "Rollback after failed rebuild also failed");
                }
                return Err(e);
            }
        }
        self.commit().await
    }

    async fn reconcile_generated(&self, table: &str, schema: &Schema, report: &mut ReconcileReport) {
        let diff = report.diff.clone();
        report.record(
            ReconcileStep::RemoveColumns,
            self.remove_columns(table, &diff.removed).await,
        );
        report.record(
            ReconcileStep::AddColumns,
            self.add_columns(table, &diff.added).await,
        );
        report.record(
            ReconcileStep::BuildIndexes,
            self.build_indexes(table, &diff.added).await,
        );
        report.record(ReconcileStep::SaveSchema, self.save_schema(table, schema).await);
    }

    async fn reconcile_shadow(&self, table: &str, schema: &Schema, report: &mut ReconcileReport) {
        report.record(
            ReconcileStep::RebuildProjection,
            self.rebuild_table(table, schema).await,
        );
        report.record(
            ReconcileStep::BuildIndexes,
            self.build_indexes(table, schema).await,
        );
        report.record(ReconcileStep::SaveSchema, self.save_schema(table, schema).await);
    }
}

impl Driver for SqlDriver {
    fn quote_identifier(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .fetch_bound(
                &self.dialect.table_exists_query(),
                &[Value::String(table.to_string())],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn create_schema_table(&self) -> Result<()> {
        self.execute(&self.ddl().generate_create_schema_table(&self.config.schema_table))
            .await
    }

    async fn create_table(&self, table: &str, schema: &Schema) -> Result<bool> {
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        schema.validate()?;
        if self.table_exists(table).await? {
            debug!(table, "Document table already exists");
            return Ok(true);
        }

        self.create_schema_table().await?;
        self.execute(&self.ddl().generate_create_table(table, schema)?)
            .await?;
        self.build_indexes(table, schema).await?;
        self.save_schema(table, schema).await?;

        info!(table, columns = schema.len(), "Created document table");
        Ok(true)
    }

    async fn save_schema(&self, table: &str, schema: &Schema) -> Result<()> {
        let schema_table = self.dialect.quote_identifier(&self.config.schema_table);
        let table_value = Value::String(table.to_string());

        let sql = format!(
            "SELECT COALESCE(MAX(schema_version), 0) FROM {} WHERE schema_table = {}",
            schema_table,
            self.dialect.placeholder(1)
        );
        let rows = self.fetch_bound(&sql, std::slice::from_ref(&table_value)).await?;
        let latest: i64 = match rows.first() {
            Some(row) => row.try_get(0)?,
            None => 0,
        };

        let sql = format!(
            "INSERT INTO {} (schema_table, schema_version, schema_time, schema_schema) VALUES ({}, {}, {}, {})",
            schema_table,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
            self.dialect.placeholder(4)
        );
        let values = [
            table_value,
            Value::from(latest + 1),
            Value::from(chrono::Utc::now().timestamp()),
            Value::String(schema.to_json()?),
        ];
        self.execute_bound(&sql, &values).await?;

        self.cache_schema(table, Some(schema.clone()));
        info!(table, version = latest + 1, "Saved document schema");
        Ok(())
    }

    async fn get_schema(&self, table: &str) -> Result<Option<Schema>> {
        if let Some(cached) = self.cached_schema(table) {
            return Ok(cached);
        }
        if !self.table_exists(&self.config.schema_table).await? {
            return Ok(None);
        }

        let sql = format!(
            "SELECT schema_schema FROM {} WHERE schema_table = {} ORDER BY schema_version DESC LIMIT 1",
            self.dialect.quote_identifier(&self.config.schema_table),
            self.dialect.placeholder(1)
        );
        let rows = self
            .fetch_bound(&sql, &[Value::String(table.to_string())])
            .await?;
        let schema = match rows.first() {
            Some(row) => Some(Schema::from_json(&row.try_get::<String, _>(0)?)?),
            None => None,
        };

        self.cache_schema(table, schema.clone());
        Ok(schema)
    }

    async fn schema_history(&self, table: &str) -> Result<Vec<SchemaVersion>> {
        if !self.table_exists(&self.config.schema_table).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT schema_version, schema_time, schema_schema FROM {} WHERE schema_table = {} ORDER BY schema_version ASC",
            self.dialect.quote_identifier(&self.config.schema_table),
            self.dialect.placeholder(1)
        );
        let rows = self
            .fetch_bound(&sql, &[Value::String(table.to_string())])
            .await?;
        rows.iter()
            .map(|row| {
                Ok(SchemaVersion {
                    version: row.try_get(0)?,
                    saved_at: row.try_get(1)?,
                    schema: Schema::from_json(&row.try_get::<String, _>(2)?)?,
                })
            })
            .collect()
    }

    async fn prepare_environment(&self, table: &str, schema: &Schema) -> Result<bool> {
        let transactional = self.dialect.transactional_ddl();
        if transactional {
            self.begin_transaction().await?;
        }

        let result = self.create_table(table, schema).await;
        match result {
            Ok(true) => {
                if transactional {
                    self.commit().await?;
                }
                Ok(true)
            }
            other => {
                if transactional {
                    if let Err(e) = self.roll_back().await {
                        warn!(table, error = %e, "Rollback of environment preparation failed");
                    }
                    self.forget_schema(table);
                }
                other
            }
        }
    }

    async fn check_environment(&self, table: &str, schema: &Schema) -> Result<bool> {
        if !self.table_exists(table).await? {
            return Ok(false);
        }
        Ok(self.get_schema(table).await?.as_ref() == Some(schema))
    }

    async fn update_environment(&self, table: &str, schema: &Schema) -> Result<ReconcileReport> {
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        schema.validate()?;

        if !self.table_exists(table).await? {
            let mut report = ReconcileReport::new(table, SchemaDiff::compute(schema, None));
            report.record(
                ReconcileStep::CreateTable,
                self.create_table(table, schema).await.map(|_| ()),
            );
            return Ok(report);
        }

        self.create_schema_table().await?;
        let persisted = self.get_schema(table).await?;
        let diff = SchemaDiff::compute(schema, persisted.as_ref());
        let mut report = ReconcileReport::new(table, diff);
        if report.diff.is_empty() {
            debug!(table, "Schema unchanged");
            return Ok(report);
        }

        info!(
            table,
            removed = report.diff.removed.len(),
            added = report.diff.added.len(),
            "Reconciling document table schema"
        );
        match self.dialect.projection() {
            Projection::Generated => self.reconcile_generated(table, schema, &mut report).await,
            Projection::Shadow => self.reconcile_shadow(table, schema, &mut report).await,
        }

        if !report.is_success() {
            warn!(table, "Schema reconciliation finished with failures");
        }
        Ok(report)
    }

    async fn select(&self, table: &str, search: &Search, params: &Params) -> Result<Vec<Value>> {
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        let sql = self.dml().generate_select(table, search)?;
        let bound = bind_named(&sql, params, |i| self.dialect.placeholder(i))?;
        let rows = self.fetch_bound(&bound.sql, &bound.values).await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(text) = row.try_get::<Option<String>, _>(0)? {
                documents.push(serde_json::from_str(&text)?);
            }
        }
        Ok(documents)
    }

    async fn count(&self, table: &str, search: &Search, params: &Params) -> Result<i64> {
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        let sql = self.dml().generate_count(table, search)?;
        let bound = bind_named(&sql, params, |i| self.dialect.placeholder(i))?;
        let rows = self.fetch_bound(&bound.sql, &bound.values).await?;
        match rows.first() {
            Some(row) => Ok(row.try_get(0)?),
            None => Ok(0),
        }
    }

    async fn insert(&self, table: &str, doc: &ChangeTracker) -> Result<bool> {
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        let schema = self.table_schema(table).await?;
        let shadow = self.shadow_values(&schema, doc);
        let columns: Vec<&str> = shadow.iter().map(|(name, _)| *name).collect();

        let mut values = vec![Value::String(serde_json::to_string(doc.data())?)];
        values.extend(shadow.iter().map(|(_, value)| value.clone()));

        let sql = self.dml().generate_insert(table, &columns);
        match self.execute_bound(&sql, &values).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_unique_violation() => {
                warn!(table, error = %e, "Insert rejected: duplicate key");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, table: &str, doc: &ChangeTracker) -> Result<bool> {
        if !doc.has_changes() {
            return Ok(true);
        }
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        let schema = self.table_schema(table).await?;
        let (key_expression, key_value) = self.row_key(&schema, doc)?;
        let shadow = self.shadow_values(&schema, doc);
        let columns: Vec<&str> = shadow.iter().map(|(name, _)| *name).collect();

        let mut values = vec![Value::String(serde_json::to_string(doc.data())?)];
        values.extend(shadow.iter().map(|(_, value)| value.clone()));
        values.push(key_value);

        let sql = self.dml().generate_update(table, &columns, &key_expression);
        let affected = self.execute_bound(&sql, &values).await?;
        Ok(affected > 0)
    }

    async fn delete(&self, table: &str, doc: &ChangeTracker) -> Result<bool> {
        validate_identifier(table, &[]).map_err(StoreError::Validation)?;
        let schema = self.table_schema(table).await?;
        let (key_expression, key_value) = self.row_key(&schema, doc)?;

        let sql = self.dml().generate_delete(table, &key_expression);
        let affected = self.execute_bound(&sql, &[key_value]).await?;
        Ok(affected > 0)
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.execute("BEGIN").await
    }

    async fn commit(&self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn roll_back(&self) -> Result<()> {
        self.execute("ROLLBACK").await
    }
}

/// Bind a JSON value with the closest native SQL type
fn bind_json<'q>(query: AnyQuery<'q>, value: &'q Value) -> AnyQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

fn scratch_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
