// crates/fleetgate-codec/src/codec.rs
// ============================================================================
// Module: Fleetgate Config Codec
// Description: Parse and emit YAML, JSON, and key=value property files.
// Purpose: Convert between raw config-file bytes and a DocumentTree.
// Dependencies: serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! The codec never panics on malformed input; every syntactic failure
//! surfaces as [`ParseError`] or [`EmitError`] so callers (the Drift Engine,
//! the Agent) can record it and keep going rather than aborting a scan or
//! deployment over one bad file (§4.1).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::document::DocumentTree;

// ============================================================================
// SECTION: Format
// ============================================================================

/// The recognized config file formats (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// YAML 1.1-compatible documents.
    Yaml,
    /// JSON documents.
    Json,
    /// `key=value` property files.
    Properties,
}

impl Format {
    /// Guesses a format from a config file's extension, used by the
    /// Deployment Orchestrator and Drift Engine drivers to pick a format
    /// without threading it through the Rule Store's `ConfigTarget`.
    ///
    /// Returns `None` for an unrecognized extension so the caller can decide
    /// whether that is a hard error or a file to skip.
    #[must_use]
    pub fn from_extension(path: &str) -> Option<Self> {
        let extension = path.rsplit('.').next()?.to_ascii_lowercase();
        match extension.as_str() {
            "yml" | "yaml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "properties" => Some(Self::Properties),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A parse failure, carrying enough context to report to an operator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{path}:{line}: {reason}")]
pub struct ParseError {
    /// Path of the file that failed to parse.
    pub path: String,
    /// Best-effort line number, `0` when unknown.
    pub line: usize,
    /// Human-readable reason.
    pub reason: String,
}

/// An emission failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{path}: {reason}")]
pub struct EmitError {
    /// Path of the file that failed to emit.
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

// ============================================================================
// SECTION: Parse
// ============================================================================

/// Parses `bytes` as `format`, stripping a UTF-8 BOM first (§4.1: "BOM-prefixed
/// UTF-8 is accepted").
///
/// # Errors
///
/// Returns [`ParseError`] when `bytes` is not valid UTF-8 or fails to parse
/// as `format`'s grammar.
pub fn parse(bytes: &[u8], format: Format, path: &str) -> Result<DocumentTree, ParseError> {
    let without_bom = strip_bom(bytes);
    let text = std::str::from_utf8(without_bom)
        .map_err(|_| ParseError { path: path.to_string(), line: 0, reason: "not valid utf-8".to_string() })?;

    match format {
        Format::Yaml => serde_yaml::from_str::<Value>(text)
            .map(DocumentTree::new)
            .map_err(|error| ParseError { path: path.to_string(), line: yaml_error_line(&error), reason: error.to_string() }),
        Format::Json => serde_json::from_str::<Value>(text)
            .map(DocumentTree::new)
            .map_err(|error| ParseError { path: path.to_string(), line: error.line(), reason: error.to_string() }),
        Format::Properties => parse_properties(text).map(DocumentTree::new).map_err(|(line, reason)| ParseError {
            path: path.to_string(),
            line,
            reason,
        }),
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

fn yaml_error_line(error: &serde_yaml::Error) -> usize {
    error.location().map_or(0, |location| location.line())
}

/// Parses `key=value` property file text into a flat JSON object of strings.
///
/// Lines beginning with `#` or `!`, and blank lines, are skipped as comments
/// (the conventional `.properties` grammar).
fn parse_properties(text: &str) -> Result<Value, (usize, String)> {
    let mut map = serde_json::Map::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err((index + 1, format!("expected 'key=value', found '{line}'")));
        };
        map.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
    }
    Ok(Value::Object(map))
}

// ============================================================================
// SECTION: Emit
// ============================================================================

/// Emits `tree` as `format`'s bytes, with a trailing newline (§4.1: emission
/// is stable, trailing newline preserved).
///
/// # Errors
///
/// Returns [`EmitError`] when `tree`'s shape cannot be represented in
/// `format` (e.g. a non-object root for `Properties`).
pub fn emit(tree: &DocumentTree, format: Format, path: &str) -> Result<Vec<u8>, EmitError> {
    match format {
        Format::Yaml => {
            let mut text = serde_yaml::to_string(tree.root())
                .map_err(|error| EmitError { path: path.to_string(), reason: error.to_string() })?;
            if !text.ends_with('\n') {
                text.push('\n');
            }
            Ok(text.into_bytes())
        }
        Format::Json => {
            let mut bytes = serde_json::to_vec_pretty(tree.root())
                .map_err(|error| EmitError { path: path.to_string(), reason: error.to_string() })?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        Format::Properties => emit_properties(tree, path),
    }
}

fn emit_properties(tree: &DocumentTree, path: &str) -> Result<Vec<u8>, EmitError> {
    let Value::Object(map) = tree.root() else {
        return Err(EmitError { path: path.to_string(), reason: "properties root must be an object".to_string() });
    };
    // `serde_json`'s `preserve_order` feature backs `Value::Object` with an
    // insertion-order map, so iterating `map` directly preserves the order
    // keys were parsed (or set) in rather than re-sorting them (§4.1: key
    // order is preserved on round-trip).
    let mut text = String::new();
    for (key, value) in map {
        let scalar = match value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Null => String::new(),
            _ => return Err(EmitError { path: path.to_string(), reason: format!("key '{key}' is not a scalar") }),
        };
        text.push_str(key);
        text.push('=');
        text.push_str(&scalar);
        text.push('\n');
    }
    Ok(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_and_emits_json_round_trip() {
        let tree = parse(b"{\"b\": 2, \"a\": 1, \"c\": 3}", Format::Json, "test.json").expect("parses");
        let bytes = emit(&tree, Format::Json, "test.json").expect("emits");
        let reparsed = parse(&bytes, Format::Json, "test.json").expect("reparses");
        assert_eq!(tree, reparsed);
        let emitted = String::from_utf8(bytes).expect("utf8");
        assert!(
            emitted.find("\"b\"").expect("has b") < emitted.find("\"a\"").expect("has a")
                && emitted.find("\"a\"").expect("has a") < emitted.find("\"c\"").expect("has c"),
            "emit reordered keys: {emitted}"
        );
    }

    #[test]
    fn from_extension_recognizes_known_extensions() {
        assert_eq!(Format::from_extension("config.yml"), Some(Format::Yaml));
        assert_eq!(Format::from_extension("config.YAML"), Some(Format::Yaml));
        assert_eq!(Format::from_extension("config.json"), Some(Format::Json));
        assert_eq!(Format::from_extension("server.properties"), Some(Format::Properties));
        assert_eq!(Format::from_extension("readme.md"), None);
    }

    #[test]
    fn accepts_bom_prefixed_utf8() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"{\"a\": 1}");
        let tree = parse(&bytes, Format::Json, "test.json").expect("parses");
        assert_eq!(tree.root(), &json!({"a": 1}));
    }

    #[test]
    fn preserves_dotted_quad_scalars_as_strings() {
        let tree = parse(b"bind-address: 0.0.0.0", Format::Yaml, "server.properties").expect("parses");
        assert_eq!(tree.descend("bind-address").expect("descends"), Some(&json!("0.0.0.0")));
    }

    #[test]
    fn parses_properties_file_skipping_comments() {
        let text = "# comment\nmotd=Welcome\n\nmax-players=20\n";
        let tree = parse(text.as_bytes(), Format::Properties, "server.properties").expect("parses");
        assert_eq!(tree.descend("motd").expect("descends"), Some(&json!("Welcome")));
        assert_eq!(tree.descend("max-players").expect("descends"), Some(&json!("20")));
    }

    #[test]
    fn emits_properties_in_insertion_key_order() {
        let tree = parse(b"b=2\na=1\nc=3\n", Format::Properties, "test.properties").expect("parses");
        let bytes = emit(&tree, Format::Properties, "test.properties").expect("emits");
        assert_eq!(String::from_utf8(bytes).expect("utf8"), "b=2\na=1\nc=3\n");
    }

    #[test]
    fn rejects_malformed_json_with_parse_error() {
        let error = parse(b"{not json", Format::Json, "bad.json").expect_err("fails");
        assert_eq!(error.path, "bad.json");
    }
}
