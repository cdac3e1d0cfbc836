//! Factory - document lifecycle for one table
//!
//! A [`Factory`] binds a [`Driver`] to a document table and a declared
//! [`Schema`]. It creates documents (running identifier and metadata hooks),
//! routes their persistence to the driver, and preprocesses searches so the
//! driver only sees fragments it can translate directly.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::FactoryConfig;
use crate::driver::Driver;
use crate::dso::{ChangeTracker, DocumentHooks, Dso, VariantTag};
use crate::error::{Result, StoreError};
use crate::schema::{ReconcileReport, SchemaVersion};
use crate::search::{DeletedFilter, Params, Search};
use crate::sql::expand::expand_paths;
use crate::types::Schema;

/// Where creation and modification metadata lives inside a document
pub const CREATED_DATE_PATH: &str = "dso.created.date";
pub const CREATED_USER_PATH: &str = "dso.created.user";
pub const MODIFIED_DATE_PATH: &str = "dso.modified.date";
pub const MODIFIED_USER_PATH: &str = "dso.modified.user";

/// Clock and caller identity used to stamp document metadata
pub trait MetadataSource: Send + Sync {
    /// Current time in Unix seconds
    fn now(&self) -> i64;

    /// Map describing who is making the change
    fn current_user(&self) -> Value;
}

/// System clock, anonymous caller
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMetadata;

impl MetadataSource for SystemMetadata {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn current_user(&self) -> Value {
        json!({ "ip": null })
    }
}

type Classifier = Box<dyn Fn(&Value) -> VariantTag + Send + Sync>;
type RejectPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Document factory for one table
pub struct Factory<D: Driver> {
    driver: D,
    config: FactoryConfig,
    schema: Schema,
    classifier: Option<Classifier>,
    hooks: HashMap<VariantTag, Arc<dyn DocumentHooks>>,
    reject_id: Option<RejectPredicate>,
    metadata: Arc<dyn MetadataSource>,
}

/// Builder for Factory
pub struct FactoryBuilder<D: Driver> {
    driver: D,
    config: FactoryConfig,
    schema: Schema,
    classifier: Option<Classifier>,
    hooks: HashMap<VariantTag, Arc<dyn DocumentHooks>>,
    reject_id: Option<RejectPredicate>,
    metadata: Arc<dyn MetadataSource>,
}

impl<D: Driver> FactoryBuilder<D> {
    pub fn new(driver: D, config: FactoryConfig) -> Self {
        Self {
            driver,
            config,
            schema: Schema::core(),
            classifier: None,
            hooks: HashMap::new(),
            reject_id: None,
            metadata: Arc::new(SystemMetadata),
        }
    }

    /// Replace the declared schema (default: [`Schema::core`])
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Pick a variant from raw document data
    pub fn classifier<F>(mut self, classify: F) -> Self
    where
        F: Fn(&Value) -> VariantTag + Send + Sync + 'static,
    {
        self.classifier = Some(Box::new(classify));
        self
    }

    /// Register lifecycle hooks for one variant
    pub fn hooks(mut self, variant: impl Into<VariantTag>, hooks: impl DocumentHooks + 'static) -> Self {
        self.hooks.insert(variant.into(), Arc::new(hooks));
        self
    }

    /// Reject generated identifiers for which the predicate returns `true`
    pub fn reject_id<F>(mut self, reject: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.reject_id = Some(Box::new(reject));
        self
    }

    pub fn metadata(mut self, source: impl MetadataSource + 'static) -> Self {
        self.metadata = Arc::new(source);
        self
    }

    pub fn build(self) -> Result<Arc<Factory<D>>> {
        self.config.validate()?;
        self.schema.validate()?;
        Ok(Arc::new(Factory {
            driver: self.driver,
            config: self.config,
            schema: self.schema,
            classifier: self.classifier,
            hooks: self.hooks,
            reject_id: self.reject_id,
            metadata: self.metadata,
        }))
    }
}

impl<D: Driver> Factory<D> {
    /// Create a factory with the default schema and hooks
    pub fn new(driver: D, config: FactoryConfig) -> Result<Arc<Self>> {
        FactoryBuilder::new(driver, config).build()
    }

    pub fn builder(driver: D, config: FactoryConfig) -> FactoryBuilder<D> {
        FactoryBuilder::new(driver, config)
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// The schema this factory was built with
    pub fn declared_schema(&self) -> &Schema {
        &self.schema
    }

    /// The latest persisted schema, or the declared one if none was saved yet
    pub async fn schema(&self) -> Result<Schema> {
        Ok(self
            .driver
            .get_schema(&self.config.table)
            .await?
            .unwrap_or_else(|| self.schema.clone()))
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.driver.quote_identifier(identifier)
    }

    // =========================================================================
    // Environment
    // =========================================================================

    pub async fn table_exists(&self) -> Result<bool> {
        self.driver.table_exists(&self.config.table).await
    }

    pub async fn create_schema_table(&self) -> Result<()> {
        self.driver.create_schema_table().await
    }

    pub async fn check_environment(&self) -> Result<bool> {
        self.driver
            .check_environment(&self.config.table, &self.schema)
            .await
    }

    pub async fn prepare_environment(&self) -> Result<bool> {
        self.driver
            .prepare_environment(&self.config.table, &self.schema)
            .await
    }

    pub async fn update_environment(&self) -> Result<ReconcileReport> {
        self.driver
            .update_environment(&self.config.table, &self.schema)
            .await
    }

    pub async fn schema_history(&self) -> Result<Vec<SchemaVersion>> {
        self.driver.schema_history(&self.config.table).await
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Draw a random identifier, retrying while the reject predicate refuses it
    pub fn generate_id(&self) -> Result<String> {
        let alphabet: Vec<char> = self.config.id_alphabet.chars().collect();
        let mut rng = rand::thread_rng();
        for _ in 0..self.config.id_max_attempts {
            let candidate: String = (0..self.config.id_length)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            match &self.reject_id {
                Some(reject) if reject(&candidate) => {
                    debug!(candidate = %candidate, "Rejected generated identifier");
                }
                _ => return Ok(candidate),
            }
        }
        Err(StoreError::IdGenerationExhausted {
            attempts: self.config.id_max_attempts,
        })
    }

    pub fn classify(&self, data: &Value) -> VariantTag {
        match &self.classifier {
            Some(classify) => classify(data),
            None => VariantTag::base(),
        }
    }

    /// Create a new document, filling in identifier and creation metadata
    ///
    /// Values already present in `data` are never overwritten. The returned
    /// document has no pending changes.
    pub fn create(self: &Arc<Self>, data: Value) -> Result<Dso<D>> {
        let mut dso = self.instantiate(data);
        self.hook_create(&mut dso)?;
        dso.reset_changes();
        Ok(dso)
    }

    /// Wrap stored data in a document without running creation hooks
    pub fn instantiate(self: &Arc<Self>, data: Value) -> Dso<D> {
        let tracker = ChangeTracker::new(data);
        let variant = self.classify(tracker.data());
        Dso::new(tracker, variant, Arc::downgrade(self))
    }

    fn hook_create(&self, dso: &mut Dso<D>) -> Result<()> {
        if is_absent(dso.get(&self.config.id_path)) {
            let id = self.generate_id()?;
            dso.set(&self.config.id_path, id);
        }
        if is_absent(dso.get(CREATED_DATE_PATH)) {
            dso.set(CREATED_DATE_PATH, self.metadata.now());
        }
        if is_absent(dso.get(CREATED_USER_PATH)) {
            dso.set(CREATED_USER_PATH, self.metadata.current_user());
        }
        if let Some(hooks) = self.hooks.get(dso.variant()) {
            hooks.on_create(dso.tracker_mut());
        }
        Ok(())
    }

    fn hook_update(&self, dso: &mut Dso<D>) {
        dso.set(MODIFIED_DATE_PATH, self.metadata.now());
        dso.set(MODIFIED_USER_PATH, self.metadata.current_user());
        if let Some(hooks) = self.hooks.get(dso.variant()) {
            hooks.on_update(dso.tracker_mut());
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Insert a document as a new row; `Ok(false)` on a duplicate key
    pub async fn insert(&self, dso: &mut Dso<D>) -> Result<bool> {
        self.hook_update(dso);
        let inserted = self.driver.insert(&self.config.table, &dso.tracker).await?;
        if inserted {
            dso.reset_changes();
        }
        Ok(inserted)
    }

    /// Persist a document's changes; `sneaky` skips modification stamping
    pub async fn update(&self, dso: &mut Dso<D>, sneaky: bool) -> Result<bool> {
        if !dso.has_changes() {
            return Ok(true);
        }
        if !sneaky {
            self.hook_update(dso);
        }
        let updated = self.driver.update(&self.config.table, &dso.tracker).await?;
        if updated {
            dso.reset_changes();
        }
        Ok(updated)
    }

    /// Mark a document deleted, or remove its row when `permanent`
    pub async fn delete(&self, dso: &mut Dso<D>, permanent: bool) -> Result<bool> {
        if permanent {
            return self.driver.delete(&self.config.table, &dso.tracker).await;
        }
        dso.set(&self.config.deleted_path, self.metadata.now());
        self.update(dso, true).await
    }

    pub async fn undelete(&self, dso: &mut Dso<D>) -> Result<bool> {
        dso.unset(&self.config.deleted_path);
        self.update(dso, true).await
    }

    // =========================================================================
    // Search
    // =========================================================================

    pub fn search(&self) -> Search {
        Search::new()
    }

    /// Copy of `search` with the deletion clause added and schema paths
    /// replaced by their column names
    ///
    /// Paths without a virtual column are left as `${path}` for the driver.
    pub async fn preprocess_search(&self, search: &Search, deleted: DeletedFilter) -> Result<Search> {
        let mut search = search.clone();

        if let Some(check) = deleted.null_check() {
            let clause = format!("${{{}}} {}", self.config.deleted_path, check);
            let combined = match search.where_clause() {
                Some(existing) => format!("({}) AND {}", existing, clause),
                None => clause,
            };
            search.set_where(combined);
        }

        let schema = self.schema().await?;
        let resolve = |path: &str| -> Result<Option<String>> {
            Ok(schema
                .column_name(path)
                .map(|column| self.driver.quote_identifier(column)))
        };
        if let Some(fragment) = search.where_clause() {
            let expanded = expand_paths(fragment, resolve)?;
            search.set_where(expanded);
        }
        if let Some(fragment) = search.order() {
            let expanded = expand_paths(fragment, resolve)?;
            search.set_order(expanded);
        }
        Ok(search)
    }

    pub async fn execute_search(
        self: &Arc<Self>,
        search: &Search,
        params: &Params,
        deleted: DeletedFilter,
    ) -> Result<Vec<Dso<D>>> {
        let search = self.preprocess_search(search, deleted).await?;
        let rows = self.driver.select(&self.config.table, &search, params).await?;
        Ok(rows.into_iter().map(|data| self.instantiate(data)).collect())
    }

    pub async fn execute_count(
        &self,
        search: &Search,
        params: &Params,
        deleted: DeletedFilter,
    ) -> Result<i64> {
        let search = self.preprocess_search(search, deleted).await?;
        self.driver.count(&self.config.table, &search, params).await
    }

    /// Find a document by its identifier
    pub async fn read(self: &Arc<Self>, id: impl Into<Value>) -> Result<Option<Dso<D>>> {
        let field = self.config.id_path.clone();
        self.read_by(&field, id, DeletedFilter::Exclude).await
    }

    /// First document whose `field` equals `value`
    pub async fn read_by(
        self: &Arc<Self>,
        field: &str,
        value: impl Into<Value>,
        deleted: DeletedFilter,
    ) -> Result<Option<Dso<D>>> {
        let search = Search::new()
            .with_where(format!("${{{}}} = :value", field))
            .with_limit(1);
        let params = Params::new().bind("value", value);
        let mut found = self.execute_search(&search, &params, deleted).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}
