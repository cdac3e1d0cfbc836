//! Path-addressed JSON documents
//!
//! A [`PathDocument`] is a tree of JSON objects addressed by dot-separated
//! paths (`"dso.id"`, `"a.b.c"`). Objects are the only addressable nodes:
//! scalars and arrays are leaves.
//!
//! Malformed paths (leading, trailing or doubled separators) never resolve
//! on read and are rejected on write.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Path separator used by every document path
pub const PATH_SEPARATOR: char = '.';

/// Split a path into its segments
///
/// The empty path addresses the whole document and yields no segments.
/// Returns `None` when any segment is empty.
pub fn path_segments(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return Some(Vec::new());
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Whether a path is well-formed (the empty path is)
pub fn is_valid_path(path: &str) -> bool {
    path_segments(path).is_some()
}

/// Join a key onto a path prefix
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, key)
    }
}

/// A nested key/value document addressed by dotted paths
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PathDocument {
    root: Value,
}

impl Default for PathDocument {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }
}

impl PathDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a raw JSON object
    ///
    /// Top-level keys may themselves be dotted paths: `{"foo.bar": 1}`
    /// becomes `{"foo": {"bar": 1}}`. Non-object input yields an empty
    /// document.
    pub fn from_value(value: Value) -> Self {
        let mut doc = Self::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                doc.merge(&key, value, true);
            }
        }
        doc
    }

    /// Build a document from a flat map of leaf paths to values
    pub fn from_flat<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut doc = Self::new();
        for (path, value) in entries {
            doc.set(path.as_ref(), value);
        }
        doc
    }

    /// The whole document as a JSON object
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.as_object().is_none_or(|m| m.is_empty())
    }

    /// Read the value at `path`
    ///
    /// The empty path returns the whole document. A path running through a
    /// scalar, a missing key, or a malformed path all return `None`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = path_segments(path)?;
        let mut node = &self.root;
        for segment in segments {
            node = node.as_object()?.get(segment)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let segments = path_segments(path)?;
        let mut node = &mut self.root;
        for segment in segments {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        Some(node)
    }

    /// Whether a value (including `null` or a falsey value) exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Replace the value at `path`, creating intermediate objects as needed
    ///
    /// Intermediate scalars along the way are replaced by objects. Setting
    /// the root only accepts an object. Returns `false` when the write was
    /// rejected.
    pub fn set(&mut self, path: &str, value: Value) -> bool {
        let Some(segments) = path_segments(path) else {
            return false;
        };
        let Some((last, parents)) = segments.split_last() else {
            if value.is_object() {
                self.root = value;
                return true;
            }
            return false;
        };

        let mut node = &mut self.root;
        for segment in parents {
            node = ensure_object(node)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(last.to_string(), value);
        true
    }

    /// Remove the value at `path`, returning it
    pub fn unset(&mut self, path: &str) -> Option<Value> {
        let segments = path_segments(path)?;
        let (last, parents) = segments.split_last()?;
        let mut node = &mut self.root;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(*segment)?;
        }
        node.as_object_mut()?.remove(*last)
    }

    /// Remove the value at `path`, then drop any ancestors left empty
    pub fn unset_pruned(&mut self, path: &str) -> Option<Value> {
        let removed = self.unset(path)?;
        let mut segments = path_segments(path).unwrap_or_default();
        segments.pop();
        while !segments.is_empty() {
            let parent = segments.join(".");
            match self.get(&parent) {
                Some(Value::Object(map)) if map.is_empty() => {
                    self.unset(&parent);
                }
                _ => break,
            }
            segments.pop();
        }
        Some(removed)
    }

    /// Merge `value` into the node at `path`
    ///
    /// Objects merge key by key. Where both sides hold a value for the same
    /// key and they are not both objects, `overwrite` decides: `false` keeps
    /// the existing value, `true` replaces it (scalar with object or the
    /// reverse). Keys only present on one side are always kept.
    pub fn merge(&mut self, path: &str, value: Value, overwrite: bool) -> bool {
        let Some(segments) = path_segments(path) else {
            return false;
        };
        if let Some(existing) = self.get_mut(path) {
            merge_values(existing, value, overwrite);
            return true;
        }
        if !overwrite && self.blocked_by_scalar(&segments) {
            return false;
        }
        self.set(path, value)
    }

    /// Flatten into an ordered map of leaf path to value
    ///
    /// Empty objects and arrays are reported as leaves.
    pub fn flatten(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        flatten_into("", &self.root, &mut out);
        out
    }

    fn blocked_by_scalar(&self, segments: &[&str]) -> bool {
        let mut node = &self.root;
        for segment in segments {
            match node {
                Value::Object(map) => match map.get(*segment) {
                    Some(child) => node = child,
                    None => return false,
                },
                _ => return true,
            }
        }
        false
    }
}

impl From<Value> for PathDocument {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

fn merge_values(target: &mut Value, incoming: Value, overwrite: bool) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(current) => merge_values(current, value, overwrite),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => {
            if overwrite {
                *target = incoming;
            }
        }
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(&join_path(prefix, key), child, out);
            }
        }
        other => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> PathDocument {
        PathDocument::from_value(json!({"a": "A", "b": {"c": "C"}}))
    }

    // =========================================================================
    // Reading
    // =========================================================================

    #[test]
    fn test_get_first_level_and_nested() {
        let doc = sample();
        assert_eq!(doc.get("a"), Some(&json!("A")));
        assert_eq!(doc.get("b.c"), Some(&json!("C")));
        assert_eq!(doc.get("b"), Some(&json!({"c": "C"})));
    }

    #[test]
    fn test_get_empty_path_returns_whole_document() {
        let doc = sample();
        assert_eq!(doc.get(""), Some(&json!({"a": "A", "b": {"c": "C"}})));
    }

    #[test]
    fn test_get_missing_keys() {
        let doc = sample();
        assert!(doc.get("nonexistent").is_none());
        assert!(doc.get("b.nonexistent").is_none());
    }

    #[test]
    fn test_get_through_scalar_is_not_found() {
        let doc = sample();
        assert!(doc.get("a.x").is_none());
        assert!(doc.get("b.c.d").is_none());
    }

    #[test]
    fn test_get_malformed_paths() {
        let doc = sample();
        for path in [
            ".", "..", "..a", "a..", "..a..", "b..c", "b..c..", "..b..c", "..b..c..", "b.c..",
            "..b.c", "..b.c..", ".a", "a.", ".a.", "b.c.", ".b.c", ".b.c.",
        ] {
            assert!(doc.get(path).is_none(), "path {:?} should not resolve", path);
        }
        let empty = PathDocument::new();
        assert!(empty.get("..a").is_none());
        assert!(empty.get("a.").is_none());
    }

    // =========================================================================
    // Writing
    // =========================================================================

    #[test]
    fn test_set_first_level_and_nested() {
        let mut doc = sample();
        doc.set("a", json!("B"));
        doc.set("new", json!("NEW"));
        doc.set("b.c", json!("D"));
        doc.set("b.new", json!("NEW"));
        assert_eq!(
            doc.as_value(),
            &json!({"a": "B", "b": {"c": "D", "new": "NEW"}, "new": "NEW"})
        );
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = PathDocument::new();
        assert!(doc.set("x.y.z", json!(1)));
        assert_eq!(doc.as_value(), &json!({"x": {"y": {"z": 1}}}));
    }

    #[test]
    fn test_set_rejects_malformed_paths() {
        let mut doc = sample();
        let before = doc.clone();
        assert!(!doc.set("a..b", json!(1)));
        assert!(!doc.set(".a", json!(1)));
        assert!(!doc.set("a.", json!(1)));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_set_root_requires_object() {
        let mut doc = sample();
        assert!(!doc.set("", json!("scalar")));
        assert!(doc.set("", json!({"z": 1})));
        assert_eq!(doc.as_value(), &json!({"z": 1}));
    }

    #[test]
    fn test_falsey_values_are_kept() {
        for value in [json!(false), json!(0), json!(""), json!({}), json!(null)] {
            let mut doc = PathDocument::from_value(json!({"foo": {"bar": "baz"}}));
            doc.set("foo.bar", value.clone());
            assert_eq!(doc.get("foo.bar"), Some(&value));
            assert!(doc.contains("foo.bar"));
        }
    }

    #[test]
    fn test_unset_returns_removed_value() {
        let mut doc = sample();
        assert_eq!(doc.unset("b.c"), Some(json!("C")));
        assert_eq!(doc.get("b"), Some(&json!({})));
        assert_eq!(doc.unset("b.c"), None);
        assert_eq!(doc.unset(""), None);
    }

    #[test]
    fn test_unset_pruned_drops_empty_parents() {
        let mut doc = PathDocument::from_value(json!({"x": {"y": {"z": 1}}, "k": 2}));
        doc.unset_pruned("x.y.z");
        assert_eq!(doc.as_value(), &json!({"k": 2}));
    }

    // =========================================================================
    // Merging
    // =========================================================================

    fn merge_base() -> PathDocument {
        PathDocument::from_value(json!({"a": "b", "c": {"d": "e"}}))
    }

    #[test]
    fn test_merge_preserves_existing_without_overwrite() {
        let mut doc = merge_base();
        doc.merge("", json!({"a": "B", "c": {"d": "E", "f": "g"}, "h": "i"}), false);
        assert_eq!(doc.get("a"), Some(&json!("b")));
        assert_eq!(doc.get("c.d"), Some(&json!("e")));
        assert_eq!(doc.get("c.f"), Some(&json!("g")));
        assert_eq!(doc.get("h"), Some(&json!("i")));
    }

    #[test]
    fn test_merge_overwrites_when_asked() {
        let mut doc = merge_base();
        doc.merge("", json!({"a": "B", "c": {"d": "E", "f": "g"}, "h": "i"}), true);
        assert_eq!(doc.get("a"), Some(&json!("B")));
        assert_eq!(doc.get("c.d"), Some(&json!("E")));
        assert_eq!(doc.get("c.f"), Some(&json!("g")));
        assert_eq!(doc.get("h"), Some(&json!("i")));
    }

    #[test]
    fn test_merge_mismatched_shapes() {
        let mut kept = merge_base();
        kept.merge("", json!({"a": {"b": "c"}, "c": "d"}), false);
        assert_eq!(kept.get("a"), Some(&json!("b")));
        assert_eq!(kept.get("c.d"), Some(&json!("e")));

        let mut replaced = merge_base();
        replaced.merge("", json!({"a": {"b": "c"}, "c": "d"}), true);
        assert_eq!(replaced.get("a.b"), Some(&json!("c")));
        assert_eq!(replaced.get("c"), Some(&json!("d")));
    }

    #[test]
    fn test_merge_falsey_values() {
        for value in [json!(false), json!(0), json!(""), json!({})] {
            let mut doc = PathDocument::from_value(json!({"foo": {"bar": "baz"}}));
            doc.merge("", json!({"foo": {"bar": value.clone()}}), true);
            assert_eq!(doc.get("foo.bar"), Some(&value));
        }
    }

    #[test]
    fn test_merge_through_scalar_without_overwrite_is_rejected() {
        let mut doc = merge_base();
        assert!(!doc.merge("a.x", json!(1), false));
        assert_eq!(doc.get("a"), Some(&json!("b")));
        assert!(doc.merge("a.x", json!(1), true));
        assert_eq!(doc.get("a.x"), Some(&json!(1)));
    }

    // =========================================================================
    // Flattening
    // =========================================================================

    #[test]
    fn test_construction_unflattens_dotted_keys() {
        let doc = PathDocument::from_value(json!({"foo.bar": "baz"}));
        assert_eq!(doc.as_value(), &json!({"foo": {"bar": "baz"}}));
    }

    #[test]
    fn test_flatten_and_back() {
        let doc = PathDocument::from_value(json!({"a": 1, "b": {"c": [1, 2], "d": {}}}));
        let flat = doc.flatten();
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b.c", "b.d"]);
        assert_eq!(PathDocument::from_flat(flat), doc);
    }

    #[test]
    fn test_arrays_are_leaves() {
        let doc = PathDocument::from_value(json!({"e": [1, 2, 3]}));
        assert_eq!(doc.get("e"), Some(&json!([1, 2, 3])));
        assert!(doc.get("e.0").is_none());
    }
}
