//! # runtara-document-store
//!
//! A schema-projected JSON document store over PostgreSQL, MySQL and SQLite.
//!
//! Documents are nested JSON objects stored whole in one column of a
//! relational table. A declared schema projects chosen paths of every
//! document into real SQL columns, so they can be indexed, filtered and
//! sorted like ordinary columns while the rest of the document stays free-form.
//!
//! ## Features
//!
//! - **Path-Addressed Documents**: Read and write nested values with dotted paths (`dso.created.date`)
//! - **Change Tracking**: Documents record which leaves changed or were removed since the last write
//! - **Virtual Columns**: Generated columns on PostgreSQL and MySQL, driver-maintained shadow columns on SQLite
//! - **Schema Reconciliation**: Declared schemas are diffed against the persisted version and applied column by column
//! - **Versioned Schema History**: Every applied schema is kept as a new version
//! - **Soft Delete**: Deletion markers with a three-way search filter
//! - **SQL Injection Prevention**: Identifiers are validated and quoted, values are always bound
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use runtara_document_store::{
//!     ColumnDescriptor, DeletedFilter, Factory, FactoryConfig, Params, Schema, Search, SqlDriver,
//!     StoreConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = SqlDriver::connect(StoreConfig::builder("sqlite::memory:").build()).await?;
//!
//!     let schema = Schema::core()
//!         .with_column("post.slug", ColumnDescriptor::new("post_slug", "VARCHAR(100)").btree().unique());
//!     let factory = Factory::builder(Arc::new(driver), FactoryConfig::builder("posts").build())
//!         .schema(schema)
//!         .build()?;
//!     factory.prepare_environment().await?;
//!
//!     // Create and insert a document
//!     let mut post = factory.create(serde_json::json!({
//!         "post": {"slug": "hello-world", "title": "Hello"}
//!     }))?;
//!     post.insert().await?;
//!
//!     // Change one field and persist only if something changed
//!     post.set("post.title", "Hello, world");
//!     post.update().await?;
//!
//!     // Search by a projected column and a free-form path
//!     let found = Search::new()
//!         .with_where("${post.slug} = :slug AND ${post.title} LIKE :title")
//!         .with_limit(10)
//!         .execute(
//!             &factory,
//!             &Params::new().bind("slug", "hello-world").bind("title", "Hello%"),
//!             DeletedFilter::Exclude,
//!         )
//!         .await?;
//!     assert_eq!(found.len(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The driver is configured using `StoreConfig`, each table's factory using
//! `FactoryConfig`:
//!
//! ```rust
//! use runtara_document_store::{FactoryConfig, StoreConfig};
//!
//! let store = StoreConfig::builder("postgres://localhost/mydb")
//!     .schema_table("document_schema") // Default schema history table
//!     .id_path("dso.id")               // Row key when no column is primary
//!     .build();
//!
//! let posts = FactoryConfig::builder("posts")
//!     .deleted_path("dso.deleted") // Soft-delete marker
//!     .id_length(8)                // Generated identifier length
//!     .build();
//! ```
//!
//! ## Sharing a Connection
//!
//! A `SqlDriver` holds a single connection. Wrap it in an `Arc` to let
//! several factories use it; open one driver per worker for parallelism.

pub mod config;
pub mod document;
pub mod driver;
pub mod dso;
pub mod error;
pub mod factory;
pub mod schema;
pub mod search;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{FactoryConfig, FactoryConfigBuilder, StoreConfig, StoreConfigBuilder};
pub use document::PathDocument;
pub use driver::Driver;
pub use dso::{ChangeTracker, DocumentHooks, Dso, VariantTag};
pub use error::{Result, StoreError};
pub use factory::{Factory, FactoryBuilder, MetadataSource, SystemMetadata};
pub use schema::{ReconcileReport, ReconcileStep, SchemaDiff, SchemaVersion, StepOutcome};
pub use search::{DeletedFilter, Params, Search};
pub use store::SqlDriver;
pub use types::{ColumnDescriptor, IndexPlan, Schema};

// Re-export SQL utilities for advanced users
pub use sql::dialect::{Backend, Dialect, Projection};
pub use sql::sanitize::{quote_identifier, validate_identifier};
