// crates/fleetgate-controller/src/http_agent_client.rs
// ============================================================================
// Module: Fleetgate HTTP Agent Client
// Description: reqwest-blocking AgentClient implementation reaching a host's
//              fleetgate-agent RPC surface (§6).
// Purpose: Let the Controller drive real agents over JSON-over-HTTP, the
//          client-side counterpart to fleetgate-agent's AgentServer.
// Dependencies: fleetgate-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! `HttpAgentClient` uses a short-timeout, redirect-disabled
//! `reqwest::blocking::Client` issuing bounded requests. Every call here
//! targets exactly the routes `fleetgate-agent::server::AgentServer` serves:
//! `GET /status`, `GET`/`PUT /config?instance&file[&deployment_id]`,
//! `POST /restart?instance?`, `POST /rollback?deployment_id`.

use std::time::Duration;

use fleetgate_core::AgentClient;
use fleetgate_core::AgentError;
use fleetgate_core::AgentInstanceStatus;
use fleetgate_core::AgentStatus;
use fleetgate_core::DeploymentId;
use fleetgate_core::HashDigest;
use fleetgate_core::HostId;
use fleetgate_core::InstanceId;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::wire::WireConfigBody;
use crate::wire::WireDigest;
use crate::wire::WireError;
use crate::wire::WireStatus;
use crate::wire::WireWriteRequest;

/// Reaches one host's agent over JSON-over-HTTP.
pub struct HttpAgentClient {
    host: HostId,
    base_url: String,
    client: Client,
}

impl HttpAgentClient {
    /// Builds a client for the agent at `base_url` (e.g. `http://10.0.0.2:9090`).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Unreachable`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(host: HostId, base_url: impl Into<String>, rpc_deadline: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(rpc_deadline)
            .redirect(Policy::none())
            .build()
            .map_err(|err| AgentError::Unreachable(format!("failed to build http client: {err}")))?;
        Ok(Self { host, base_url: base_url.into(), client })
    }

    /// Joins `base_url` and `path` into a request URL.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl AgentClient for HttpAgentClient {
    fn status(&self) -> Result<AgentStatus, AgentError> {
        let response = self
            .client
            .get(self.url("/status"))
            .send()
            .map_err(|err| AgentError::Unreachable(format!("{}: {err}", self.host)))?;
        let response = check_status(response)?;
        let wire: WireStatus =
            response.json().map_err(|err| AgentError::Io(format!("invalid status response: {err}")))?;
        Ok(AgentStatus {
            host: HostId::new(wire.host),
            version: wire.version,
            instances: wire
                .instances
                .into_iter()
                .map(|entry| AgentInstanceStatus { id: InstanceId::new(entry.id), active: entry.active })
                .collect(),
            needs_restart: wire.needs_restart.into_iter().map(InstanceId::new).collect(),
        })
    }

    fn read_config(&self, instance: &InstanceId, file: &str) -> Result<Vec<u8>, AgentError> {
        let response = self
            .client
            .get(self.url("/config"))
            .query(&[("instance", instance.as_str()), ("file", file)])
            .send()
            .map_err(|err| AgentError::Unreachable(format!("{}: {err}", self.host)))?;
        let response = check_status(response)?;
        let wire: WireConfigBody =
            response.json().map_err(|err| AgentError::Io(format!("invalid config response: {err}")))?;
        wire.decode().map_err(|err| AgentError::Io(format!("invalid base64 body: {err}")))
    }

    fn write_config(
        &self,
        instance: &InstanceId,
        file: &str,
        bytes: &[u8],
        deployment_id: DeploymentId,
    ) -> Result<HashDigest, AgentError> {
        let response = self
            .client
            .put(self.url("/config"))
            .query(&[
                ("instance", instance.as_str()),
                ("file", file),
                ("deployment_id", &deployment_id.get().to_string()),
            ])
            .json(&WireWriteRequest::encode(bytes))
            .send()
            .map_err(|err| AgentError::Unreachable(format!("{}: {err}", self.host)))?;
        let response = check_status(response)?;
        let wire: WireDigest =
            response.json().map_err(|err| AgentError::Io(format!("invalid digest response: {err}")))?;
        wire.into_digest().map_err(AgentError::Io)
    }

    fn restart(&self, instance: Option<&InstanceId>) -> Result<(), AgentError> {
        let mut request = self.client.post(self.url("/restart"));
        if let Some(instance) = instance {
            request = request.query(&[("instance", instance.as_str())]);
        }
        let response = request.send().map_err(|err| AgentError::Unreachable(format!("{}: {err}", self.host)))?;
        check_status(response)?;
        Ok(())
    }

    fn rollback(&self, deployment_id: DeploymentId) -> Result<(), AgentError> {
        let response = self
            .client
            .post(self.url("/rollback"))
            .query(&[("deployment_id", &deployment_id.get().to_string())])
            .send()
            .map_err(|err| AgentError::Unreachable(format!("{}: {err}", self.host)))?;
        check_status(response)?;
        Ok(())
    }
}

/// Maps a non-2xx response to an [`AgentError`], consuming the error body.
fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<WireError>()
        .map(|wire| wire.error)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("agent request failed").to_string());
    Err(match status {
        StatusCode::NOT_FOUND => AgentError::NotFound(message),
        StatusCode::BAD_GATEWAY => AgentError::Unreachable(message),
        _ => AgentError::Io(message),
    })
}
