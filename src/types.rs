//! Core type definitions for the document store
//!
//! Includes virtual column descriptors and the path-keyed schema that maps
//! document paths onto physical SQL columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::is_valid_path;
use crate::error::{Result, StoreError};
use crate::sql::DATA_COLUMN;
use crate::sql::sanitize::{validate_identifier, validate_index_kind, validate_sql_type};

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Virtual Column Descriptors
// ============================================================================

/// Descriptor for one virtual column projected out of the JSON document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Physical column name (must be a valid identifier)
    pub name: String,

    /// SQL type of the column (e.g. `VARCHAR(16)`, `BIGINT`)
    #[serde(rename = "type")]
    pub sql_type: String,

    /// Index kind (e.g. `BTREE`); no index when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    /// Whether the index enforces uniqueness
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,

    /// Whether the column identifies the row
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary: bool,
}

/// How a column should be indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPlan {
    /// Row key: a unique index the backend treats as the primary key
    Primary,
    /// Unique index, with an optional index kind
    Unique(Option<String>),
    /// Non-unique index of the given kind
    Plain(String),
    /// No index at all
    None,
}

impl ColumnDescriptor {
    /// Create a descriptor with a column name and SQL type
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            index: None,
            unique: false,
            primary: false,
        }
    }

    /// Index the column with the given kind
    pub fn index(mut self, kind: impl Into<String>) -> Self {
        self.index = Some(kind.into());
        self
    }

    /// Index the column with a B-tree
    pub fn btree(self) -> Self {
        self.index("BTREE")
    }

    /// Make the column's index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Make the column the row key
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn index_plan(&self) -> IndexPlan {
        if self.primary {
            IndexPlan::Primary
        } else if self.unique {
            IndexPlan::Unique(self.index.clone())
        } else if let Some(kind) = &self.index {
            IndexPlan::Plain(kind.clone())
        } else {
            IndexPlan::None
        }
    }

    /// Check name, type and index kind before they are embedded in DDL
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, &[DATA_COLUMN]).map_err(StoreError::Validation)?;
        validate_sql_type(&self.sql_type).map_err(StoreError::Validation)?;
        if let Some(kind) = &self.index {
            validate_index_kind(kind).map_err(StoreError::Validation)?;
        }
        Ok(())
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Mapping from document path to virtual column descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: BTreeMap<String, ColumnDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bookkeeping columns every document table carries by default
    ///
    /// - `dso.id` → `dso_id`: unique B-tree, row key
    /// - `dso.type` → `dso_type`: B-tree
    /// - `dso.deleted` → `dso_deleted`: B-tree
    pub fn core() -> Self {
        Self::new()
            .with_column(
                "dso.id",
                ColumnDescriptor::new("dso_id", "VARCHAR(16)")
                    .btree()
                    .unique()
                    .primary(),
            )
            .with_column(
                "dso.type",
                ColumnDescriptor::new("dso_type", "VARCHAR(30)").btree(),
            )
            .with_column(
                "dso.deleted",
                ColumnDescriptor::new("dso_deleted", "BIGINT").btree(),
            )
    }

    /// Add or replace a column (builder style)
    pub fn with_column(mut self, path: impl Into<String>, column: ColumnDescriptor) -> Self {
        self.columns.insert(path.into(), column);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, column: ColumnDescriptor) {
        self.columns.insert(path.into(), column);
    }

    pub fn remove(&mut self, path: &str) -> Option<ColumnDescriptor> {
        self.columns.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(path)
    }

    /// Physical column name for a document path
    pub fn column_name(&self, path: &str) -> Option<&str> {
        self.columns.get(path).map(|c| c.name.as_str())
    }

    /// The row-key column, if one is declared
    pub fn primary(&self) -> Option<(&str, &ColumnDescriptor)> {
        self.iter().find(|(_, column)| column.primary)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.columns.iter().map(|(path, column)| (path.as_str(), column))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Validate every path and descriptor
    ///
    /// Paths must be well-formed and non-empty, column names unique, and at
    /// most one column may be the row key.
    pub fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for (path, column) in self.iter() {
            if path.is_empty() || !is_valid_path(path) {
                return Err(StoreError::invalid_path(path));
            }
            column.validate()?;
            if !names.insert(column.name.as_str()) {
                return Err(StoreError::validation(format!(
                    "Column name '{}' is used by more than one path",
                    column.name
                )));
            }
        }
        if self.columns.values().filter(|c| c.primary).count() > 1 {
            return Err(StoreError::validation(
                "Only one column may be declared primary",
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl FromIterator<(String, ColumnDescriptor)> for Schema {
    fn from_iter<T: IntoIterator<Item = (String, ColumnDescriptor)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
