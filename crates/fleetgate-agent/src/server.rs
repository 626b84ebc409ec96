// crates/fleetgate-agent/src/server.rs
// ============================================================================
// Module: Fleetgate Agent RPC Server
// Description: tiny_http accept loop implementing the Agent RPC surface (§6).
// Purpose: Expose an AgentClient over JSON-over-HTTP for the Controller to
//          reach.
// Dependencies: base64, fleetgate-core, serde_json, tiny_http, tracing
// ============================================================================

//! ## Overview
//! One thread runs [`Server::incoming_requests`] and dispatches each request
//! synchronously; the game-host agent has no need for an async runtime.

use std::collections::HashMap;
use std::io::Read as _;
use std::num::NonZeroU64;
use std::sync::Arc;

use fleetgate_core::AgentClient;
use fleetgate_core::AgentError;
use fleetgate_core::DeploymentId;
use fleetgate_core::InstanceId;
use tiny_http::Header;
use tiny_http::Method;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::Server;
use tracing::error;
use tracing::info;

use crate::error::AgentLocalError;
use crate::query::split_url;
use crate::wire::WireConfigBody;
use crate::wire::WireDigest;
use crate::wire::WireError;
use crate::wire::WireStatus;
use crate::wire::WireWriteRequest;

/// Largest request body this server will buffer before rejecting a write.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// A JSON response: status code plus serialized body.
struct RpcResponse {
    status: u16,
    body: Vec<u8>,
}

impl RpcResponse {
    fn json<T: serde::Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_vec(body).unwrap_or_else(|_| b"{\"error\":\"response serialization failed\"}".to_vec());
        Self { status, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &WireError::new(message))
    }

    fn empty(status: u16) -> Self {
        Self { status, body: Vec::new() }
    }
}

/// Serves the Agent RPC surface over `bind_addr` until the process exits.
pub struct AgentServer {
    agent: Arc<dyn AgentClient>,
}

impl AgentServer {
    /// Wraps an [`AgentClient`] implementation as a JSON-over-HTTP server.
    #[must_use]
    pub fn new(agent: Arc<dyn AgentClient>) -> Self {
        Self { agent }
    }

    /// Runs the accept loop, handling requests one at a time.
    ///
    /// # Errors
    ///
    /// Returns [`AgentLocalError::Bind`] if `bind_addr` cannot be bound.
    pub fn run(&self, bind_addr: &str) -> Result<(), AgentLocalError> {
        let server = Server::http(bind_addr)
            .map_err(|err| AgentLocalError::Bind { addr: bind_addr.to_string(), detail: err.to_string() })?;
        info!(bind_addr, "agent rpc server listening");
        for mut request in server.incoming_requests() {
            let response = self.handle(&mut request);
            if let Err(err) = respond(request, response) {
                error!(error = %err, "failed to write rpc response");
            }
        }
        Ok(())
    }

    /// Dispatches one request to its handler.
    fn handle(&self, request: &mut Request) -> RpcResponse {
        let method = request.method().clone();
        let url = request.url().to_string();
        let (path, query) = split_url(&url);
        match (&method, path) {
            (Method::Get, "/status") => self.handle_status(),
            (Method::Get, "/config") => self.handle_read_config(&query),
            (Method::Put, "/config") => self.handle_write_config(request, &query),
            (Method::Post, "/restart") => self.handle_restart(&query),
            (Method::Post, "/rollback") => self.handle_rollback(&query),
            _ => RpcResponse::error(404, format!("no route for {method:?} {path}")),
        }
    }

    fn handle_status(&self) -> RpcResponse {
        match self.agent.status() {
            Ok(status) => RpcResponse::json(200, &WireStatus::from(&status)),
            Err(err) => response_for_error(&err),
        }
    }

    fn handle_read_config(&self, query: &HashMap<String, String>) -> RpcResponse {
        let (Some(instance), Some(file)) = (query.get("instance"), query.get("file")) else {
            return RpcResponse::error(400, "instance and file query parameters are required");
        };
        match self.agent.read_config(&InstanceId::new(instance.as_str()), file) {
            Ok(bytes) => RpcResponse::json(200, &WireConfigBody::encode(&bytes)),
            Err(err) => response_for_error(&err),
        }
    }

    fn handle_write_config(&self, request: &mut Request, query: &HashMap<String, String>) -> RpcResponse {
        let (Some(instance), Some(file), Some(deployment_id)) =
            (query.get("instance"), query.get("file"), query.get("deployment_id").and_then(|raw| raw.parse::<u64>().ok()))
        else {
            return RpcResponse::error(400, "instance, file, and deployment_id query parameters are required");
        };
        let Some(deployment_id) = NonZeroU64::new(deployment_id).map(DeploymentId::new) else {
            return RpcResponse::error(400, "deployment_id must be non-zero");
        };
        let body = match read_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        let write_request: WireWriteRequest = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(err) => return RpcResponse::error(400, format!("invalid json body: {err}")),
        };
        let bytes = match write_request.decode() {
            Ok(bytes) => bytes,
            Err(err) => return RpcResponse::error(400, format!("invalid base64 body: {err}")),
        };
        match self.agent.write_config(&InstanceId::new(instance.as_str()), file, &bytes, deployment_id) {
            Ok(digest) => RpcResponse::json(200, &WireDigest::from(&digest)),
            Err(err) => response_for_error(&err),
        }
    }

    fn handle_restart(&self, query: &HashMap<String, String>) -> RpcResponse {
        let instance = query.get("instance").map(|id| InstanceId::new(id.as_str()));
        match self.agent.restart(instance.as_ref()) {
            Ok(()) => RpcResponse::empty(200),
            Err(err) => response_for_error(&err),
        }
    }

    fn handle_rollback(&self, query: &HashMap<String, String>) -> RpcResponse {
        let Some(deployment_id) = query.get("deployment_id").and_then(|raw| raw.parse::<u64>().ok()).and_then(NonZeroU64::new).map(DeploymentId::new)
        else {
            return RpcResponse::error(400, "deployment_id query parameter is required and must be non-zero");
        };
        match self.agent.rollback(deployment_id) {
            Ok(()) => RpcResponse::empty(200),
            Err(err) => response_for_error(&err),
        }
    }
}

/// Reads a request body up to [`MAX_BODY_BYTES`], rejecting anything larger.
fn read_body(request: &mut Request) -> Result<Vec<u8>, RpcResponse> {
    let mut buf = Vec::new();
    let limit = MAX_BODY_BYTES.saturating_add(1);
    let mut limited = request.as_reader().take(limit);
    limited.read_to_end(&mut buf).map_err(|err| RpcResponse::error(500, format!("failed to read request body: {err}")))?;
    if buf.len() as u64 > MAX_BODY_BYTES {
        return Err(RpcResponse::error(413, "request body exceeds the agent's size limit"));
    }
    Ok(buf)
}

/// Maps an [`AgentError`] to its HTTP status code and wire error body.
fn response_for_error(err: &AgentError) -> RpcResponse {
    let status = match err {
        AgentError::NotFound(_) => 404,
        AgentError::Unreachable(_) => 502,
        AgentError::ProcessControl(_) => 502,
        AgentError::Io(_) => 500,
    };
    RpcResponse::error(status, err.to_string())
}

/// Sends `response` back over `request`, attaching the JSON content type.
fn respond(request: Request, response: RpcResponse) -> std::io::Result<()> {
    let mut tiny_response = Response::from_data(response.body).with_status_code(response.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        tiny_response.add_header(header);
    }
    request.respond(tiny_response)
}
