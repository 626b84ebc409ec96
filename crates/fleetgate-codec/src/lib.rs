// crates/fleetgate-codec/src/lib.rs
// ============================================================================
// Module: Fleetgate Codec Library
// Description: Public API surface for the Fleetgate config codec.
// Purpose: Expose document tree and parse/emit types to the rest of Fleetgate.
// Dependencies: crate::{codec, document}
// ============================================================================

//! ## Overview
//! Reads and writes the three config-file grammars Fleetgate manages: YAML,
//! JSON, and `key=value` property files, converting each into a single
//! format-neutral [`DocumentTree`] that the Resolver and Drift Engine can
//! compare against without caring which grammar a given file used.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod document;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::EmitError;
pub use codec::Format;
pub use codec::ParseError;
pub use codec::emit;
pub use codec::parse;
pub use document::DocumentTree;
pub use document::ShapeMismatch;
