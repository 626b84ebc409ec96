// crates/fleetgate-agent/src/wire.rs
// ============================================================================
// Module: Fleetgate Agent Wire Types
// Description: JSON request/response shapes for the Agent RPC surface (§6).
// Purpose: Give the RPC server a stable, base64-safe wire format for file
//          bytes, independent of fleetgate-core's domain types.
// Dependencies: base64, fleetgate-core, serde, serde_json
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use fleetgate_core::AgentInstanceStatus;
use fleetgate_core::AgentStatus;
use fleetgate_core::HashAlgorithm;
use fleetgate_core::HashDigest;
use fleetgate_core::InstanceId;
use serde::Deserialize;
use serde::Serialize;

/// Wire form of [`AgentInstanceStatus`].
#[derive(Debug, Serialize)]
struct WireInstanceStatus {
    id: String,
    active: bool,
}

impl From<&AgentInstanceStatus> for WireInstanceStatus {
    fn from(status: &AgentInstanceStatus) -> Self {
        Self { id: status.id.to_string(), active: status.active }
    }
}

/// Wire form of [`AgentStatus`], returned by `GET /status`.
#[derive(Debug, Serialize)]
pub(crate) struct WireStatus {
    host: String,
    version: String,
    instances: Vec<WireInstanceStatus>,
    needs_restart: Vec<String>,
}

impl From<&AgentStatus> for WireStatus {
    fn from(status: &AgentStatus) -> Self {
        Self {
            host: status.host.to_string(),
            version: status.version.clone(),
            instances: status.instances.iter().map(WireInstanceStatus::from).collect(),
            needs_restart: status.needs_restart.iter().map(InstanceId::to_string).collect(),
        }
    }
}

/// Body of a `GET /config` response.
#[derive(Debug, Serialize)]
pub(crate) struct WireConfigBody {
    bytes_base64: String,
}

impl WireConfigBody {
    pub(crate) fn encode(bytes: &[u8]) -> Self {
        Self { bytes_base64: STANDARD.encode(bytes) }
    }
}

/// Body of a `PUT /config` request.
#[derive(Debug, Deserialize)]
pub(crate) struct WireWriteRequest {
    bytes_base64: String,
}

impl WireWriteRequest {
    /// Decodes the base64 payload into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes_base64` is not valid base64.
    pub(crate) fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.bytes_base64)
    }
}

/// Wire form of [`HashDigest`], returned by `PUT /config`.
#[derive(Debug, Serialize)]
pub(crate) struct WireDigest {
    algorithm: String,
    value: String,
}

impl From<&HashDigest> for WireDigest {
    fn from(digest: &HashDigest) -> Self {
        let algorithm = match digest.algorithm {
            HashAlgorithm::Sha256 => "sha256",
        };
        Self { algorithm: algorithm.to_string(), value: digest.value.clone() }
    }
}

/// Uniform error body for non-2xx responses.
#[derive(Debug, Serialize)]
pub(crate) struct WireError {
    error: String,
}

impl WireError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
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
    fn config_body_round_trips_through_base64() {
        let body = WireConfigBody::encode(b"motd=hello");
        let json = serde_json::to_string(&body).expect("serialize");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        let encoded = parsed["bytes_base64"].as_str().expect("string field");
        assert_eq!(STANDARD.decode(encoded).expect("decode"), b"motd=hello");
    }

    #[test]
    fn write_request_decodes_base64_field() {
        let json = format!(r#"{{"bytes_base64":"{}"}}"#, STANDARD.encode(b"motd=hi"));
        let request: WireWriteRequest = serde_json::from_str(&json).expect("parse");
        assert_eq!(request.decode().expect("decode"), b"motd=hi");
    }
}
