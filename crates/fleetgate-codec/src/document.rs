// crates/fleetgate-codec/src/document.rs
// ============================================================================
// Module: Fleetgate Document Tree
// Description: Format-neutral in-memory representation of a parsed config file.
// Purpose: Provide shape-checked key descent for the Drift Engine and Resolver.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A [`DocumentTree`] wraps a parsed config file's value tree, whether it came
//! from YAML, JSON, or a properties file. The top-level document may be a map
//! or a list (§4.1); [`DocumentTree::descend`] walks a dotted key path and
//! reports a [`ShapeMismatch`] rather than panicking when a prefix of the path
//! is not a map, so the Drift Engine can record the failure and move on to the
//! next key instead of aborting the scan (§4.4).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Document Tree
// ============================================================================

/// A parsed config document's value tree.
///
/// # Invariants
/// - The root may be any JSON value shape; callers handle a list root
///   themselves rather than assuming a map (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTree(Value);

impl DocumentTree {
    /// Wraps an already-parsed value as a document tree.
    #[must_use]
    pub const fn new(root: Value) -> Self {
        Self(root)
    }

    /// Returns the document's root value.
    #[must_use]
    pub const fn root(&self) -> &Value {
        &self.0
    }

    /// Consumes the tree, returning its root value.
    #[must_use]
    pub fn into_root(self) -> Value {
        self.0
    }

    /// Descends a dotted key path (e.g. `"economy.starting-balance"`) into
    /// this document, returning `Ok(None)` when the key is simply absent at
    /// an otherwise-map prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeMismatch`] when a non-final path segment names a value
    /// that is not a map, so the caller can record drift and continue rather
    /// than treating this as a fatal parse failure.
    pub fn descend(&self, dotted_key: &str) -> Result<Option<&Value>, ShapeMismatch> {
        let mut current = &self.0;
        let mut walked = String::new();
        for segment in dotted_key.split('.') {
            let Value::Object(map) = current else {
                return Err(ShapeMismatch { key: dotted_key.to_string(), at: walked });
            };
            match map.get(segment) {
                Some(next) => current = next,
                None => return Ok(None),
            }
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
        }
        Ok(Some(current))
    }

    /// Lists the dotted key paths of every leaf (non-map, non-list scalar)
    /// value reachable from the root, used by the Drift Engine to find
    /// observed keys with no expectation (§4.4's `EXTRA` classification).
    ///
    /// Streams via an explicit worklist rather than recursion, so very large
    /// documents (§4.4: >10^5 leaves) do not risk stack growth proportional
    /// to document depth times breadth.
    #[must_use]
    pub fn leaf_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let mut worklist = vec![(String::new(), &self.0)];
        while let Some((prefix, value)) = worklist.pop() {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                        worklist.push((path, child));
                    }
                }
                _ => {
                    if !prefix.is_empty() {
                        keys.push(prefix);
                    }
                }
            }
        }
        keys
    }

    /// Sets the value at a dotted key path, creating intermediate maps as
    /// needed, the write-side counterpart to [`descend`](Self::descend) used
    /// by the Deployment Orchestrator to apply a resolved expected value
    /// into an observed document before re-emitting it.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeMismatch`] when a non-final path segment already names
    /// a non-map value; a deployment plan must not silently clobber such a
    /// node.
    pub fn set(&mut self, dotted_key: &str, value: Value) -> Result<(), ShapeMismatch> {
        let mut current = &mut self.0;
        let mut walked = String::new();
        let segments: Vec<&str> = dotted_key.split('.').collect();
        for (index, segment) in segments.iter().enumerate() {
            if !current.is_object() {
                if matches!(current, Value::Null) {
                    *current = Value::Object(serde_json::Map::new());
                } else {
                    return Err(ShapeMismatch { key: dotted_key.to_string(), at: walked });
                }
            }
            let Value::Object(map) = current else {
                return Err(ShapeMismatch { key: dotted_key.to_string(), at: walked });
            };
            if index + 1 == segments.len() {
                map.insert((*segment).to_string(), value);
                return Ok(());
            }
            current = map.entry((*segment).to_string()).or_insert(Value::Null);
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
        }
        Ok(())
    }
}

/// A key path could not be descended because a non-final segment's value is
/// not a map (§4.4: `reason = "shape_mismatch"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    /// Full dotted key path that was being descended.
    pub key: String,
    /// Prefix of `key` at which descent failed.
    pub at: String,
}

impl std::fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot descend into non-map value at '{}' while resolving key '{}'", self.at, self.key)
    }
}

impl std::error::Error for ShapeMismatch {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descend_finds_nested_key() {
        let tree = DocumentTree::new(json!({"economy": {"starting-balance": 500}}));
        assert_eq!(tree.descend("economy.starting-balance").expect("descends"), Some(&json!(500)));
    }

    #[test]
    fn descend_reports_absent_key_as_none() {
        let tree = DocumentTree::new(json!({"economy": {}}));
        assert_eq!(tree.descend("economy.starting-balance").expect("descends"), None);
    }

    #[test]
    fn descend_reports_shape_mismatch_on_non_map_prefix() {
        let tree = DocumentTree::new(json!({"economy": [1, 2, 3]}));
        let error = tree.descend("economy.starting-balance").expect_err("mismatches");
        assert_eq!(error.at, "economy");
    }

    #[test]
    fn leaf_keys_lists_every_scalar_path() {
        let tree = DocumentTree::new(json!({"a": {"b": 1, "c": 2}, "d": "x"}));
        let mut keys = tree.leaf_keys();
        keys.sort();
        assert_eq!(keys, vec!["a.b".to_string(), "a.c".to_string(), "d".to_string()]);
    }

    #[test]
    fn set_overwrites_existing_nested_key() {
        let mut tree = DocumentTree::new(json!({"economy": {"enabled": true}}));
        tree.set("economy.enabled", json!(false)).expect("sets");
        assert_eq!(tree.descend("economy.enabled").expect("descends"), Some(&json!(false)));
    }

    #[test]
    fn set_creates_missing_intermediate_maps() {
        let mut tree = DocumentTree::new(json!({}));
        tree.set("economy.starting-balance", json!(500)).expect("sets");
        assert_eq!(tree.descend("economy.starting-balance").expect("descends"), Some(&json!(500)));
    }

    #[test]
    fn set_reports_shape_mismatch_on_non_map_prefix() {
        let mut tree = DocumentTree::new(json!({"economy": [1, 2, 3]}));
        let error = tree.set("economy.starting-balance", json!(500)).expect_err("mismatches");
        assert_eq!(error.at, "economy");
    }
}
