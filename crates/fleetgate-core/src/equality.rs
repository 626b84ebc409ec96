// crates/fleetgate-core/src/equality.rs
// ============================================================================
// Module: Fleetgate Type-Normalized Equality
// Description: Equality semantics for comparing observed config values against
//              resolved expectations.
// Purpose: Decide whether an observed leaf matches its resolved expected value,
//          independent of incidental lexical differences.
// Dependencies: bigdecimal, serde_json
// ============================================================================

//! ## Overview
//! The Drift Engine (§4.4) never compares raw JSON values with `==`: a config
//! author writing `8080.0` and a rule declaring `8080` describe the same
//! value, and whitespace around a string scalar is not drift. This module
//! centralizes that "type-normalized equality" so the Drift Engine and the
//! Resolver's coercion step share one notion of sameness.
//!
//! Numeric comparison is decimal-aware (via `BigDecimal`) rather than
//! float-based, so values like `0.1 + 0.2` round-tripped through a config
//! file never spuriously disagree with `0.3` due to float imprecision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Number;
use serde_json::Value;

// ============================================================================
// SECTION: Type-Normalized Equality
// ============================================================================

/// Returns true when `actual` and `expected` are equal under type-normalized
/// equality: numeric types compare decimal-aware, strings compare with
/// leading/trailing whitespace trimmed, sequences compare elementwise, and
/// maps compare by keyed equality.
#[must_use]
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        (Value::String(left), Value::String(right)) => left.trim() == right.trim(),
        (Value::Bool(left), Value::Bool(right)) => left == right,
        (Value::Null, Value::Null) => true,
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right.iter()).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left.iter().all(|(key, left_value)| {
                    right.get(key).is_some_and(|right_value| values_equal(left_value, right_value))
                })
        }
        _ => false,
    }
}

/// Compares two JSON numbers for decimal-aware equality.
///
/// `8080` and `8080.0` compare equal: both parse to the same `BigDecimal`,
/// which resolves the int-vs-zero-fraction-float open question in favor of
/// equality rather than a lexical-form mismatch.
fn numbers_equal(left: &Number, right: &Number) -> bool {
    match (decimal_from_number(left), decimal_from_number(right)) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}

/// Parses a JSON number into `BigDecimal` via its stable string representation.
fn decimal_from_number(number: &Number) -> Option<BigDecimal> {
    BigDecimal::from_str(&number.to_string()).ok()
}
