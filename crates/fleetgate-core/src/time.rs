// crates/fleetgate-core/src/time.rs
// ============================================================================
// Module: Fleetgate Time Model
// Description: Wall-clock timestamp representation for audit columns and drift logs.
// Purpose: Provide a single RFC 3339 timestamp type shared by every persisted record.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Unlike a deterministic replay log, Fleetgate's audit columns (`last_seen`,
//! `updated_at`, `detected_at`) are genuine wall-clock observations: discovery
//! and drift scans run against live instances on a schedule (§4.9), so the
//! timestamp a rule was last touched or an instance was last seen is itself
//! part of the tie-break rule in §3. `Timestamp` wraps [`OffsetDateTime`] and
//! serializes as RFC 3339 text, matching the `Agent`/`Controller` RPC wire
//! format in §6.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// A UTC wall-clock timestamp, serialized as RFC 3339 text.
///
/// # Invariants
/// - Always compared and ordered by the underlying instant, never by string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Wraps an existing [`OffsetDateTime`].
    #[must_use]
    pub const fn from_offset_date_time(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Returns the wrapped [`OffsetDateTime`].
    #[must_use]
    pub const fn as_offset_date_time(self) -> OffsetDateTime {
        self.0
    }

    /// Parses a timestamp from RFC 3339 text.
    ///
    /// # Errors
    ///
    /// Returns a [`time::error::Parse`] error when `text` is not valid RFC 3339.
    pub fn parse_rfc3339(text: &str) -> Result<Self, time::error::Parse> {
        OffsetDateTime::parse(text, &Rfc3339).map(Self)
    }

    /// Formats the timestamp as RFC 3339 text.
    ///
    /// # Errors
    ///
    /// Returns a [`time::error::Format`] error if formatting fails.
    pub fn to_rfc3339(self) -> Result<String, time::error::Format> {
        self.0.format(&Rfc3339)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(text) => f.write_str(&text),
            Err(_) => fmt::Debug::fmt(&self.0, f),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let text = self.0.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn round_trips_through_rfc3339() {
        let text = "2026-08-01T12:00:00Z";
        let parsed = Timestamp::parse_rfc3339(text).expect("parse");
        assert_eq!(parsed.to_rfc3339().expect("format"), "2026-08-01T12:00:00Z");
    }

    #[test]
    fn orders_by_instant() {
        let earlier = Timestamp::parse_rfc3339("2026-08-01T12:00:00Z").expect("parse");
        let later = Timestamp::parse_rfc3339("2026-08-01T12:00:01Z").expect("parse");
        assert!(earlier < later);
    }
}
