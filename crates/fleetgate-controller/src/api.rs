// crates/fleetgate-controller/src/api.rs
// ============================================================================
// Module: Fleetgate Control Plane API
// Description: axum HTTP surface over the Controller (§4.6, §4.10).
// Purpose: Let operators and the CLI drive resolution, rules, deployments,
//          and drift scans over HTTP.
// Dependencies: fleetgate-core, fleetgate-codec, axum, tokio
// ============================================================================

//! ## Overview
//! Grounded on the `Router::new().route(...).with_state(state)` /
//! `tokio::net::TcpListener::bind` / `axum::serve` wiring used for the HTTP
//! transport elsewhere in the ecosystem. Every handler bridges into
//! `Controller`'s blocking internals with `tokio::task::spawn_blocking`,
//! the same pattern used to keep a blocking constructor off the async
//! runtime.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use fleetgate_core::ConfigTarget;
use fleetgate_core::ConfigType;
use fleetgate_core::DeploymentId;
use fleetgate_core::GroupId;
use fleetgate_core::Instance;
use fleetgate_core::InstanceGroup;
use fleetgate_core::InstanceId;
use fleetgate_core::NewConfigRule;
use fleetgate_core::Plugin;
use fleetgate_core::ResolveQuery;
use fleetgate_core::RuleFilter;
use fleetgate_core::RuleId;
use fleetgate_core::Scope;
use fleetgate_core::Tag;
use fleetgate_core::TagId;
use fleetgate_core::ValueType;
use serde::Deserialize;
use serde::Serialize;
use tracing::error;

use crate::controller::Controller;
use crate::deployment::ChangeRequest;
use crate::deployment::Deployment;
use crate::error::ControllerError;

/// Builds the API router over `controller`.
#[must_use]
pub fn router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/instances", get(list_instances).put(register_instance))
        .route("/resolve", get(resolve))
        .route("/drift", get(drift))
        .route("/rules", get(list_rules).post(put_rule))
        .route("/rules/{id}", post(deactivate_rule))
        .route("/plugins", put(put_plugin))
        .route("/groups", put(put_group))
        .route("/groups/{id}/members", post(add_group_member))
        .route("/tags", put(put_tag))
        .route("/tags/{id}/members", post(add_tag_member))
        .route("/deployments", post(plan_deployment))
        .route("/deployments/{id}", get(get_deployment))
        .route("/deployments/{id}/execute", post(execute_deployment))
        .route("/deployments/{id}/rollback", post(rollback_deployment))
        .with_state(controller)
}

/// Binds and serves the API router on `addr` until the process is signalled.
///
/// # Errors
///
/// Returns [`std::io::Error`] if `addr` cannot be bound.
pub async fn serve(controller: Arc<Controller>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(controller);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// Maps a [`ControllerError`] to an HTTP response, never leaking a raw
/// `Debug` dump to the caller.
fn error_response(err: ControllerError) -> Response {
    error!(error = %err, "controller api request failed");
    let status = match &err {
        ControllerError::UnknownInstance(_) => StatusCode::NOT_FOUND,
        ControllerError::Store(fleetgate_core::StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        ControllerError::Orchestrator(crate::error::OrchestratorError::NoSuchDeployment(_)) => StatusCode::NOT_FOUND,
        ControllerError::Orchestrator(crate::error::OrchestratorError::NotPlanned(_))
        | ControllerError::Orchestrator(crate::error::OrchestratorError::PlatformMismatch { .. })
        | ControllerError::Orchestrator(crate::error::OrchestratorError::NoActiveRule { .. })
        | ControllerError::Store(fleetgate_core::StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError { error: err.to_string() })).into_response()
}

/// JSON error envelope returned on any non-2xx response.
#[derive(Serialize)]
struct ApiError {
    /// Human-readable failure detail.
    error: String,
}

/// Handles `GET /instances`.
async fn list_instances(State(controller): State<Arc<Controller>>) -> Response {
    let result = tokio::task::spawn_blocking(move || controller.list_instances()).await;
    match result {
        Ok(Ok(instances)) => Json(instances).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "list_instances task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `PUT /instances`.
async fn register_instance(State(controller): State<Arc<Controller>>, Json(instance): Json<Instance>) -> Response {
    let result = tokio::task::spawn_blocking(move || controller.register_instance(instance)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "register_instance task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /resolve` query parameters.
#[derive(Debug, Deserialize)]
struct ResolveParams {
    /// Instance to resolve against.
    instance: String,
    /// Dotted key path.
    key: String,
    /// Config file relative path.
    file: String,
    /// Plugin owning `file`, if any.
    plugin: Option<String>,
}

/// Handles `GET /resolve`.
async fn resolve(State(controller): State<Arc<Controller>>, Query(params): Query<ResolveParams>) -> Response {
    let query = ResolveQuery {
        instance: InstanceId::new(params.instance),
        target: ConfigTarget {
            config_type: if params.plugin.is_some() { ConfigType::Plugin } else { ConfigType::Standard },
            plugin: params.plugin.map(fleetgate_core::PluginId::new),
            file: params.file,
            key: params.key,
        },
    };
    let result = tokio::task::spawn_blocking(move || controller.resolve(&query)).await;
    match result {
        Ok(Ok(Some(resolved))) => Json(Some(ResolvedValueDto {
            rule_id: resolved.rule_id.get(),
            security_sensitive: resolved.security_sensitive,
            value: resolved.value,
        }))
        .into_response(),
        Ok(Ok(None)) => Json(Option::<ResolvedValueDto>::None).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "resolve task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// JSON-serializable projection of [`fleetgate_core::ResolvedValue`], which
/// does not itself derive `Serialize`.
#[derive(Serialize)]
struct ResolvedValueDto {
    /// The rule that won resolution.
    rule_id: u64,
    /// Whether this key is flagged security-sensitive.
    security_sensitive: bool,
    /// Fully substituted, type-coerced value.
    value: serde_json::Value,
}

/// `GET /drift` query parameters.
#[derive(Debug, Deserialize)]
struct DriftParams {
    /// Restrict the scan to a single instance. Scans every active instance
    /// when omitted.
    instance: Option<String>,
}

/// Handles `GET /drift`.
async fn drift(State(controller): State<Arc<Controller>>, Query(params): Query<DriftParams>) -> Response {
    let result = tokio::task::spawn_blocking(move || match params.instance {
        Some(instance) => controller.scan_drift(&InstanceId::new(instance)),
        None => controller.scan_drift_all(),
    })
    .await;
    match result {
        Ok(Ok(items)) => Json(items).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "drift task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Request body for `POST /rules`.
#[derive(Debug, Deserialize)]
struct PutRuleRequest {
    /// Scope this rule applies at.
    scope: Scope,
    /// Target this rule sets.
    target: ConfigTarget,
    /// Literal value, pre variable-substitution.
    value: serde_json::Value,
    /// Declared type the literal must coerce into.
    value_type: ValueType,
    /// Whether drift on this key is elevated to `error` severity.
    #[serde(default)]
    security_sensitive: bool,
}

/// `GET /rules` query parameters.
#[derive(Debug, Deserialize)]
struct ListRulesParams {
    /// Restrict to rules targeting this plugin, when set.
    plugin: Option<String>,
    /// Restrict to rules at this file, when set.
    file: Option<String>,
    /// Restrict to active rules only.
    #[serde(default)]
    active_only: bool,
}

/// Handles `GET /rules`.
async fn list_rules(State(controller): State<Arc<Controller>>, Query(params): Query<ListRulesParams>) -> Response {
    let filter = RuleFilter {
        plugin: params.plugin.map(fleetgate_core::PluginId::new),
        file: params.file,
        active_only: params.active_only,
    };
    let result = tokio::task::spawn_blocking(move || controller.list_rules(&filter)).await;
    match result {
        Ok(Ok(rules)) => Json(rules).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "list_rules task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `POST /rules`.
async fn put_rule(State(controller): State<Arc<Controller>>, Json(body): Json<PutRuleRequest>) -> Response {
    let rule = NewConfigRule { scope: body.scope, target: body.target, value: body.value, value_type: body.value_type, security_sensitive: body.security_sensitive };
    let result = tokio::task::spawn_blocking(move || controller.set_rule(rule)).await;
    match result {
        Ok(Ok(id)) => (StatusCode::CREATED, Json(serde_json::json!({"id": id.get()}))).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "put_rule task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `POST /rules/{id}`.
async fn deactivate_rule(State(controller): State<Arc<Controller>>, Path(id): Path<u64>) -> Response {
    let Some(rule_id) = RuleId::from_raw(id) else {
        return (StatusCode::BAD_REQUEST, Json(ApiError { error: "rule id must be non-zero".to_string() })).into_response();
    };
    let result = tokio::task::spawn_blocking(move || controller.deactivate_rule(rule_id)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "deactivate_rule task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `PUT /plugins`.
async fn put_plugin(State(controller): State<Arc<Controller>>, Json(plugin): Json<Plugin>) -> Response {
    let result = tokio::task::spawn_blocking(move || controller.put_plugin(plugin)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "put_plugin task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `PUT /groups`.
async fn put_group(State(controller): State<Arc<Controller>>, Json(group): Json<InstanceGroup>) -> Response {
    let result = tokio::task::spawn_blocking(move || controller.put_group(group)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "put_group task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Request body for `POST /groups/{id}/members` and `POST /tags/{id}/members`.
#[derive(Debug, Deserialize)]
struct AddMemberRequest {
    /// Instance to add to the group or tag.
    instance: String,
}

/// Handles `POST /groups/{id}/members`.
async fn add_group_member(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Response {
    let group = GroupId::new(id);
    let instance = InstanceId::new(body.instance);
    let result = tokio::task::spawn_blocking(move || controller.add_group_member(&group, &instance)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "add_group_member task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `PUT /tags`.
async fn put_tag(State(controller): State<Arc<Controller>>, Json(tag): Json<Tag>) -> Response {
    let result = tokio::task::spawn_blocking(move || controller.put_tag(tag)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "put_tag task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `POST /tags/{id}/members`.
async fn add_tag_member(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Response {
    let tag = TagId::new(id);
    let instance = InstanceId::new(body.instance);
    let result = tokio::task::spawn_blocking(move || controller.add_tag_member(&tag, &instance)).await;
    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "add_tag_member task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `POST /deployments`.
async fn plan_deployment(State(controller): State<Arc<Controller>>, Json(requests): Json<Vec<ChangeRequest>>) -> Response {
    let result = tokio::task::spawn_blocking(move || controller.plan_deployment(requests)).await;
    respond_with_deployment(result, StatusCode::CREATED)
}

/// Handles `GET /deployments/{id}`.
async fn get_deployment(State(controller): State<Arc<Controller>>, Path(id): Path<u64>) -> Response {
    let Some(deployment_id) = DeploymentId::from_raw(id) else {
        return (StatusCode::BAD_REQUEST, Json(ApiError { error: "deployment id must be non-zero".to_string() })).into_response();
    };
    let result = tokio::task::spawn_blocking(move || controller.get_deployment(deployment_id)).await;
    match result {
        Ok(Some(deployment)) => Json(deployment).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(error = %err, "get_deployment task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles `POST /deployments/{id}/execute`.
async fn execute_deployment(State(controller): State<Arc<Controller>>, Path(id): Path<u64>) -> Response {
    let Some(deployment_id) = DeploymentId::from_raw(id) else {
        return (StatusCode::BAD_REQUEST, Json(ApiError { error: "deployment id must be non-zero".to_string() })).into_response();
    };
    let result = tokio::task::spawn_blocking(move || controller.execute_deployment(deployment_id)).await;
    respond_with_deployment(result, StatusCode::OK)
}

/// Handles `POST /deployments/{id}/rollback`.
async fn rollback_deployment(State(controller): State<Arc<Controller>>, Path(id): Path<u64>) -> Response {
    let Some(deployment_id) = DeploymentId::from_raw(id) else {
        return (StatusCode::BAD_REQUEST, Json(ApiError { error: "deployment id must be non-zero".to_string() })).into_response();
    };
    let result = tokio::task::spawn_blocking(move || controller.rollback_deployment(deployment_id)).await;
    respond_with_deployment(result, StatusCode::OK)
}

/// Shared response mapping for every endpoint returning a [`Deployment`].
fn respond_with_deployment(result: Result<Result<Deployment, ControllerError>, tokio::task::JoinError>, ok_status: StatusCode) -> Response {
    match result {
        Ok(Ok(deployment)) => (ok_status, Json(deployment)).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => {
            error!(error = %err, "deployment task join failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
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

    use fleetgate_core::ConfigTarget;
    use fleetgate_core::ConfigType;
    use fleetgate_core::InstanceId;
    use fleetgate_core::StoreError;

    use super::*;
    use crate::error::OrchestratorError;

    fn target() -> ConfigTarget {
        ConfigTarget { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string(), key: "motd".to_string() }
    }

    #[test]
    fn unknown_instance_maps_to_not_found() {
        let response = error_response(ControllerError::UnknownInstance(InstanceId::new("GONE")));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let response = error_response(ControllerError::Store(StoreError::NotFound("rule 1".to_string())));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn no_such_deployment_maps_to_not_found() {
        let response = error_response(ControllerError::Orchestrator(OrchestratorError::NoSuchDeployment(DeploymentId::from_raw(1).expect("nonzero"))));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn platform_mismatch_maps_to_bad_request() {
        let response = error_response(ControllerError::Orchestrator(OrchestratorError::PlatformMismatch { instance: InstanceId::new("SMP101"), target: target() }));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_invalid_maps_to_bad_request() {
        let response = error_response(ControllerError::Store(StoreError::Invalid("bad value".to_string())));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn codec_failure_falls_back_to_internal_server_error() {
        let response = error_response(ControllerError::Orchestrator(OrchestratorError::Codec { instance: InstanceId::new("SMP101"), file: "server.properties".to_string(), detail: "boom".to_string() }));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
