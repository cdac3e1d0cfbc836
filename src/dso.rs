//! Change-tracked documents
//!
//! [`ChangeTracker`] wraps a [`PathDocument`] and records, per leaf path,
//! what was written since the last reset and what was removed. [`Dso`] is a
//! tracked document bound to the [`Factory`] that created it, so it can
//! persist itself.
//!
//! Invariants kept by the tracker:
//! - a leaf path is never recorded as both changed and removed
//! - setting a value equal to the current one records nothing
//! - arrays are leaves; they are compared and replaced whole

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{PathDocument, is_valid_path, join_path, path_segments};
use crate::driver::Driver;
use crate::error::{Result, StoreError};
use crate::factory::Factory;

// ============================================================================
// Change Tracking
// ============================================================================

/// A document plus the changes and removals made to it since the last reset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeTracker {
    data: PathDocument,
    changes: PathDocument,
    removals: PathDocument,
}

impl ChangeTracker {
    /// Wrap raw data with no changes recorded
    ///
    /// Dotted top-level keys are unflattened.
    pub fn new(data: Value) -> Self {
        Self {
            data: PathDocument::from_value(data),
            ..Self::default()
        }
    }

    pub fn document(&self) -> &PathDocument {
        &self.data
    }

    /// The whole document
    pub fn data(&self) -> &Value {
        self.data.as_value()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.data.get(path)
    }

    /// Values written since the last reset, as a nested object
    pub fn changes(&self) -> &Value {
        self.changes.as_value()
    }

    /// Values removed since the last reset, as a nested object
    pub fn removals(&self) -> &Value {
        self.removals.as_value()
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || !self.removals.is_empty()
    }

    pub fn reset_changes(&mut self) {
        self.changes = PathDocument::new();
        self.removals = PathDocument::new();
    }

    /// Write `value` at `path`
    ///
    /// Objects are applied key by key: keys missing from the new object are
    /// unset, and only leaves that actually differ are recorded. Malformed
    /// paths and non-object values at the root are ignored.
    pub fn set(&mut self, path: &str, value: Value) {
        if !is_valid_path(path) || (path.is_empty() && !value.is_object()) {
            return;
        }
        if self.data.get(path) == Some(&value) {
            return;
        }

        match value {
            Value::Object(map) => {
                match self.data.get(path) {
                    Some(Value::Object(current)) => {
                        let stale: Vec<String> = current
                            .keys()
                            .filter(|key| !map.contains_key(*key))
                            .cloned()
                            .collect();
                        for key in stale {
                            self.unset(&join_path(path, &key));
                        }
                    }
                    _ => {
                        self.data.set(path, Value::Object(Map::new()));
                        if map.is_empty() {
                            self.record_change(path, Value::Object(Map::new()));
                        }
                    }
                }
                for (key, child) in map {
                    self.set(&join_path(path, &key), child);
                }
            }
            leaf => {
                self.record_change(path, leaf.clone());
                self.data.set(path, leaf);
            }
        }
    }

    /// Remove the value at `path`, returning it
    pub fn unset(&mut self, path: &str) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        let removed = self.data.unset(path)?;
        self.changes.unset_pruned(path);
        self.removals.merge(path, removed.clone(), true);
        Some(removed)
    }

    /// Merge a nested object into the document
    ///
    /// With `overwrite` false, existing values win over incoming ones.
    pub fn merge(&mut self, value: Value, overwrite: bool) {
        let mut merged = self.data.clone();
        merged.merge("", value, overwrite);
        self.set("", merged.into_value());
    }

    fn record_change(&mut self, path: &str, value: Value) {
        self.changes.set(path, value);
        self.removals.unset_pruned(path);

        // a removal recorded at an ancestor leaf is superseded as well
        let segments = path_segments(path).unwrap_or_default();
        for end in 1..segments.len() {
            let ancestor = segments[..end].join(".");
            let superseded = match self.removals.get(&ancestor) {
                Some(Value::Object(map)) => map.is_empty(),
                Some(_) => true,
                None => false,
            };
            if superseded {
                self.removals.unset_pruned(&ancestor);
            }
        }
    }
}

// ============================================================================
// Variants and Hooks
// ============================================================================

/// Tag selecting the behavior variant of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantTag(String);

impl VariantTag {
    /// Tag used when no classifier picks anything more specific
    pub const BASE: &'static str = "dso";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn base() -> Self {
        Self::new(Self::BASE)
    }

    pub fn is_base(&self) -> bool {
        self.0 == Self::BASE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VariantTag {
    fn default() -> Self {
        Self::base()
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariantTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Per-variant lifecycle hooks
///
/// Run after the factory's own bookkeeping hooks.
pub trait DocumentHooks: Send + Sync {
    /// Called once when a new document is created (not when a row is read)
    fn on_create(&self, _doc: &mut ChangeTracker) {}

    /// Called before a document is inserted or (non-sneakily) updated
    fn on_update(&self, _doc: &mut ChangeTracker) {}
}

// ============================================================================
// Dso
// ============================================================================

/// A change-tracked document bound to its factory
pub struct Dso<D: Driver> {
    pub(crate) tracker: ChangeTracker,
    variant: VariantTag,
    factory: Weak<Factory<D>>,
}

impl<D: Driver> Dso<D> {
    pub(crate) fn new(tracker: ChangeTracker, variant: VariantTag, factory: Weak<Factory<D>>) -> Self {
        Self {
            tracker,
            variant,
            factory,
        }
    }

    /// A document with no factory; persistence calls fail with
    /// [`StoreError::FactoryUnavailable`]
    pub fn detached(data: Value) -> Self {
        Self::new(ChangeTracker::new(data), VariantTag::base(), Weak::new())
    }

    pub fn factory(&self) -> Result<Arc<Factory<D>>> {
        self.factory.upgrade().ok_or(StoreError::FactoryUnavailable)
    }

    pub fn variant(&self) -> &VariantTag {
        &self.variant
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn data(&self) -> &Value {
        self.tracker.data()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.tracker.get(path)
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        self.tracker.set(path, value.into());
    }

    pub fn unset(&mut self, path: &str) -> Option<Value> {
        self.tracker.unset(path)
    }

    pub fn merge(&mut self, value: Value, overwrite: bool) {
        self.tracker.merge(value, overwrite);
    }

    pub fn changes(&self) -> &Value {
        self.tracker.changes()
    }

    pub fn removals(&self) -> &Value {
        self.tracker.removals()
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    pub fn reset_changes(&mut self) {
        self.tracker.reset_changes();
    }

    /// Persist as a new row; `Ok(false)` when the row key is already taken
    pub async fn insert(&mut self) -> Result<bool> {
        self.factory()?.insert(self).await
    }

    /// Persist changes, running update hooks first
    ///
    /// A document without changes is not written and reports success.
    pub async fn update(&mut self) -> Result<bool> {
        if !self.has_changes() {
            return Ok(true);
        }
        self.factory()?.update(self, false).await
    }

    /// Persist changes without running update hooks
    pub async fn update_sneaky(&mut self) -> Result<bool> {
        if !self.has_changes() {
            return Ok(true);
        }
        self.factory()?.update(self, true).await
    }

    /// Soft-delete (mark with a timestamp), or remove the row when `permanent`
    pub async fn delete(&mut self, permanent: bool) -> Result<bool> {
        self.factory()?.delete(self, permanent).await
    }

    /// Clear the soft-delete marker
    pub async fn undelete(&mut self) -> Result<bool> {
        self.factory()?.undelete(self).await
    }
}

impl<D: Driver> fmt::Debug for Dso<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dso")
            .field("variant", &self.variant)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
