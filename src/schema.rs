//! Schema reconciliation types
//!
//! Includes the diff between a declared and a persisted schema, the
//! persisted schema history entries, and the report produced when a table
//! is brought in line with its declared schema.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::types::Schema;

/// One persisted schema revision of a document table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Monotonically increasing per table, starting at 1
    pub version: i64,
    /// Unix seconds at which the revision was saved
    #[serde(rename = "savedAt")]
    pub saved_at: i64,
    pub schema: Schema,
}

/// Symmetric difference between the persisted and declared schemas
///
/// A path whose descriptor changed appears in both `removed` (old
/// descriptor) and `added` (new descriptor).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub unchanged: Schema,
    pub removed: Schema,
    pub added: Schema,
}

impl SchemaDiff {
    /// Diff `declared` against `persisted`; a missing persisted schema makes
    /// every declared column "added"
    pub fn compute(declared: &Schema, persisted: Option<&Schema>) -> Self {
        let mut diff = Self::default();
        if let Some(persisted) = persisted {
            for (path, column) in persisted.iter() {
                if declared.get(path) == Some(column) {
                    diff.unchanged.insert(path, column.clone());
                } else {
                    diff.removed.insert(path, column.clone());
                }
            }
        }
        for (path, column) in declared.iter() {
            if diff.unchanged.get(path).is_none() {
                diff.added.insert(path, column.clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// A sub-step of schema reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStep {
    /// Create the table from scratch (table did not exist)
    CreateTable,
    RemoveColumns,
    AddColumns,
    /// Re-derive shadow columns from every stored document
    RebuildProjection,
    BuildIndexes,
    SaveSchema,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateTable => "create table",
            Self::RemoveColumns => "remove columns",
            Self::AddColumns => "add columns",
            Self::RebuildProjection => "rebuild projection",
            Self::BuildIndexes => "build indexes",
            Self::SaveSchema => "save schema",
        };
        f.write_str(name)
    }
}

/// Outcome of one attempted step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: ReconcileStep,
    pub error: Option<String>,
}

/// What a reconciliation run did
///
/// Steps keep running after a failure; the report fails as a whole if any
/// step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub table: String,
    pub diff: SchemaDiff,
    pub steps: Vec<StepOutcome>,
}

impl ReconcileReport {
    pub fn new(table: impl Into<String>, diff: SchemaDiff) -> Self {
        Self {
            table: table.into(),
            diff,
            steps: Vec::new(),
        }
    }

    /// Record a step result, logging failures
    pub fn record(&mut self, step: ReconcileStep, result: Result<()>) {
        let error = match result {
            Ok(()) => None,
            Err(e) => {
                warn!(table = %self.table, step = %step, error = %e, "Schema reconciliation step failed");
                Some(e.to_string())
            }
        };
        self.steps.push(StepOutcome { step, error });
    }

    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.error.is_some())
    }

    /// Whether nothing needed to change
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}
