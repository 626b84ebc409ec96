// crates/fleetgate-controller/src/wire.rs
// ============================================================================
// Module: Fleetgate Controller Agent-Client Wire Types
// Description: JSON shapes the controller decodes from / encodes to an
//              agent's RPC surface (§6).
// Purpose: Give HttpAgentClient a base64-safe wire format for file bytes,
//          independently of fleetgate-agent's own wire module.
// Dependencies: base64, fleetgate-core, serde, serde_json
// ============================================================================

//! JSON shapes the controller decodes from / encodes to an agent's RPC
//! surface (§6).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use fleetgate_core::HashAlgorithm;
use fleetgate_core::HashDigest;
use serde::Deserialize;
use serde::Serialize;

/// Wire form of one instance's status, decoded from `GET /status`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireInstanceStatus {
    pub(crate) id: String,
    pub(crate) active: bool,
}

/// Wire form of `GET /status`'s full response body.
#[derive(Debug, Deserialize)]
pub(crate) struct WireStatus {
    pub(crate) host: String,
    pub(crate) version: String,
    pub(crate) instances: Vec<WireInstanceStatus>,
    pub(crate) needs_restart: Vec<String>,
}

/// Wire form of `GET /config`'s response body.
#[derive(Debug, Deserialize)]
pub(crate) struct WireConfigBody {
    bytes_base64: String,
}

impl WireConfigBody {
    /// Decodes the base64 payload into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes_base64` is not valid base64.
    pub(crate) fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.bytes_base64)
    }
}

/// Wire form of `PUT /config`'s request body.
#[derive(Debug, Serialize)]
pub(crate) struct WireWriteRequest {
    bytes_base64: String,
}

impl WireWriteRequest {
    pub(crate) fn encode(bytes: &[u8]) -> Self {
        Self { bytes_base64: STANDARD.encode(bytes) }
    }
}

/// Wire form of a digest returned by `PUT /config`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireDigest {
    algorithm: String,
    value: String,
}

impl WireDigest {
    /// Converts the wire form into a [`HashDigest`].
    ///
    /// # Errors
    ///
    /// Returns an error string when `algorithm` is not recognized.
    pub(crate) fn into_digest(self) -> Result<HashDigest, String> {
        let algorithm = match self.algorithm.as_str() {
            "sha256" => HashAlgorithm::Sha256,
            other => return Err(format!("unrecognized hash algorithm: {other}")),
        };
        Ok(HashDigest { algorithm, value: self.value })
    }
}

/// Uniform error body the agent returns for non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub(crate) error: String,
}
