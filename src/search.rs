//! Search descriptions
//!
//! A [`Search`] carries raw SQL fragments for the WHERE and ORDER BY
//! clauses, where document paths are written as `${path}` and values as
//! `:name` parameters, plus an optional limit and offset. It holds no
//! connection of its own; [`Search::execute`] and [`Search::count`] run it
//! through a [`Factory`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::driver::Driver;
use crate::dso::Dso;
use crate::error::Result;
use crate::factory::Factory;

/// Which documents a search returns with respect to soft deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedFilter {
    /// Only documents without a deletion marker
    #[default]
    Exclude,
    /// Only soft-deleted documents
    Only,
    /// Everything
    Any,
}

impl DeletedFilter {
    /// The null check applied to the deletion path, if any
    pub fn null_check(self) -> Option<&'static str> {
        match self {
            Self::Exclude => Some("IS NULL"),
            Self::Only => Some("IS NOT NULL"),
            Self::Any => None,
        }
    }
}

impl From<Option<bool>> for DeletedFilter {
    fn from(deleted: Option<bool>) -> Self {
        match deleted {
            Some(false) => Self::Exclude,
            Some(true) => Self::Only,
            None => Self::Any,
        }
    }
}

/// Named parameter values for a search
///
/// Names may be given with or without the leading `:`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder style)
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0
            .insert(name.trim_start_matches(':').to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name.trim_start_matches(':'))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}

/// A query over one document table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Search {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    where_clause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WHERE fragment (builder style)
    pub fn with_where(mut self, fragment: impl Into<String>) -> Self {
        self.set_where(fragment);
        self
    }

    /// Set the ORDER BY fragment (builder style)
    pub fn with_order(mut self, fragment: impl Into<String>) -> Self {
        self.set_order(fragment);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Replace the WHERE fragment; a blank fragment clears it
    pub fn set_where(&mut self, fragment: impl Into<String>) {
        self.where_clause = non_blank(fragment.into());
    }

    /// Replace the ORDER BY fragment; a blank fragment clears it
    pub fn set_order(&mut self, fragment: impl Into<String>) {
        self.order = non_blank(fragment.into());
    }

    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    pub fn set_offset(&mut self, offset: Option<u64>) {
        self.offset = offset;
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Run the search and hydrate every matching row into a document
    pub async fn execute<D: Driver>(
        &self,
        factory: &Arc<Factory<D>>,
        params: &Params,
        deleted: DeletedFilter,
    ) -> Result<Vec<Dso<D>>> {
        factory.execute_search(self, params, deleted).await
    }

    /// Count matching rows
    pub async fn count<D: Driver>(
        &self,
        factory: &Factory<D>,
        params: &Params,
        deleted: DeletedFilter,
    ) -> Result<i64> {
        factory.execute_count(self, params, deleted).await
    }
}

fn non_blank(fragment: String) -> Option<String> {
    if fragment.trim().is_empty() {
        None
    } else {
        Some(fragment)
    }
}
