use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{AdminIdentity, NodeIdentity, UserIdentity};
use crate::console_relay;
use crate::errors::{PanelError, PanelResult};
use crate::lifecycle::CreateParams;
use crate::models::{
    Node, NodeStatus, PowerAction, Server, ServerStatus, ServerType, DEFAULT_MC_VERSION,
};
use crate::PanelState;

// Request/response bodies are explicit per endpoint and validated before
// any domain logic runs.

#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub plan_id: String,
    #[serde(default)]
    pub mc_version: Option<String>,
    #[serde(default)]
    pub server_type: Option<ServerType>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct ServerResponse {
    pub id: Uuid,
    pub name: String,
    pub node_id: String,
    pub plan_id: String,
    pub port: u16,
    pub ram_mb: u64,
    pub cpu_limit: f64,
    pub disk_gb: u64,
    pub mc_version: String,
    pub server_type: ServerType,
    pub status: ServerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lxc_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Server> for ServerResponse {
    fn from(server: Server) -> Self {
        Self {
            id: server.id,
            name: server.name,
            node_id: server.node_id,
            plan_id: server.plan_id,
            port: server.port,
            ram_mb: server.ram_mb,
            cpu_limit: server.cpu_limit,
            disk_gb: server.disk_gb,
            mc_version: server.mc_version,
            server_type: server.server_type,
            status: server.status,
            lxc_ip: server.lxc_ip,
            created_at: server.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResizeServerRequest {
    pub plan_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusSyncRequest {
    pub status: String,
    #[serde(default)]
    pub lxc_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PortCheckQuery {
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct PortCheckResponse {
    pub port: u16,
    pub available: bool,
}

/// Operator view of the capacity ledger. Node secrets never leave the
/// process.
#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub id: String,
    pub address: String,
    pub agent_port: u16,
    pub status: NodeStatus,
    pub total_ram_mb: u64,
    pub allocated_ram_mb: u64,
    pub max_servers: usize,
}

impl From<Node> for NodeResponse {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            address: node.address,
            agent_port: node.agent_port,
            status: node.status,
            total_ram_mb: node.total_ram_mb,
            allocated_ram_mb: node.allocated_ram_mb,
            max_servers: node.max_servers,
        }
    }
}

pub fn router(state: PanelState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/versions", get(list_versions))
        .route("/nodes", get(list_nodes))
        .route("/servers", post(create_server).get(list_servers))
        .route("/servers/port-check", get(port_check))
        .route("/servers/{id}", get(get_server).delete(delete_server))
        .route("/servers/{id}/start", post(start_server))
        .route("/servers/{id}/stop", post(stop_server))
        .route("/servers/{id}/restart", post(restart_server))
        .route("/servers/{id}/resize", post(resize_server))
        .route("/servers/{id}/metrics", get(server_metrics))
        .route(
            "/servers/{id}/properties",
            get(get_properties).put(put_properties),
        )
        .route("/servers/{id}/console", get(console_upgrade))
        .route("/internal/servers/{id}/status", post(status_sync))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_versions(State(state): State<PanelState>) -> Json<Vec<String>> {
    Json(state.versions.versions().await)
}

async fn list_nodes(
    State(state): State<PanelState>,
    _admin: AdminIdentity,
) -> Json<Vec<NodeResponse>> {
    let nodes = state.store.nodes().await;
    Json(nodes.into_iter().map(NodeResponse::from).collect())
}

async fn create_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Json(body): Json<CreateServerRequest>,
) -> PanelResult<(StatusCode, Json<ServerResponse>)> {
    state.rate_limiter.check_create(&user.user_id)?;

    let mc_version = body
        .mc_version
        .unwrap_or_else(|| DEFAULT_MC_VERSION.to_string());
    // Advisory check against the cached manifest; an unfetched manifest
    // fails open so upstream downtime cannot block provisioning.
    if state.versions.is_known(&mc_version).await == Some(false) {
        return Err(PanelError::Validation(format!(
            "unknown Minecraft version '{}'",
            mc_version
        )));
    }

    let params = CreateParams {
        name: body.name,
        plan_id: body.plan_id,
        mc_version,
        server_type: body.server_type.unwrap_or_default(),
        requested_port: body.port,
    };
    let server = state.lifecycle.create_server(&user.user_id, params).await?;
    Ok((StatusCode::CREATED, Json(server.into())))
}

async fn list_servers(
    State(state): State<PanelState>,
    user: UserIdentity,
) -> Json<Vec<ServerResponse>> {
    let servers = state.store.servers_for_user(&user.user_id).await;
    Json(servers.into_iter().map(ServerResponse::from).collect())
}

async fn get_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<Json<ServerResponse>> {
    let server = state.lifecycle.owned_server(&user.user_id, id).await?;
    Ok(Json(server.into()))
}

async fn delete_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<StatusCode> {
    state.lifecycle.delete_server(&user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<Json<ServerResponse>> {
    power(state, user, id, PowerAction::Start).await
}

async fn stop_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<Json<ServerResponse>> {
    power(state, user, id, PowerAction::Stop).await
}

async fn restart_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<Json<ServerResponse>> {
    power(state, user, id, PowerAction::Restart).await
}

async fn power(
    state: PanelState,
    user: UserIdentity,
    id: Uuid,
    action: PowerAction,
) -> PanelResult<Json<ServerResponse>> {
    state.rate_limiter.check_power(&user.user_id)?;
    let server = state
        .lifecycle
        .power_action(&user.user_id, id, action)
        .await?;
    Ok(Json(server.into()))
}

async fn resize_server(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<ResizeServerRequest>,
) -> PanelResult<Json<ServerResponse>> {
    let server = state
        .lifecycle
        .resize_server(&user.user_id, id, &body.plan_id)
        .await?;
    Ok(Json(server.into()))
}

async fn server_metrics(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<Json<Value>> {
    let server = state.lifecycle.owned_server(&user.user_id, id).await?;
    let node = state.lifecycle.node_of(&server).await?;
    let metrics = state.agent.fetch_metrics(&node, server.id).await?;
    Ok(Json(metrics))
}

async fn get_properties(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
) -> PanelResult<String> {
    let server = state.lifecycle.owned_server(&user.user_id, id).await?;
    let node = state.lifecycle.node_of(&server).await?;
    state.agent.fetch_properties(&node, server.id).await
}

async fn put_properties(
    State(state): State<PanelState>,
    user: UserIdentity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> PanelResult<StatusCode> {
    let server = state.lifecycle.owned_server(&user.user_id, id).await?;
    let node = state.lifecycle.node_of(&server).await?;
    state.agent.put_properties(&node, server.id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Authentication happens in-band (first frame), so the upgrade itself is
/// unauthenticated.
async fn console_upgrade(
    State(state): State<PanelState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| console_relay::handle_console_session(socket, id, state))
        .into_response()
}

async fn port_check(
    State(state): State<PanelState>,
    Query(query): Query<PortCheckQuery>,
) -> Json<PortCheckResponse> {
    Json(PortCheckResponse {
        port: query.port,
        available: state.store.port_free_everywhere(query.port).await,
    })
}

/// Status Sync Receiver: the only inbound channel for authoritative state
/// corrections, callable by node watchdogs only.
async fn status_sync(
    State(state): State<PanelState>,
    node: NodeIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusSyncRequest>,
) -> PanelResult<StatusCode> {
    state
        .lifecycle
        .apply_status_report(&node.node_id, id, &body.status, body.lxc_ip)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerType;
    use chrono::Utc;

    #[test]
    fn test_node_response_carries_no_secret() {
        let node = Node {
            id: "a".to_string(),
            address: "10.0.0.1".to_string(),
            agent_port: 8080,
            secret: "node-secret".to_string(),
            status: NodeStatus::Online,
            total_ram_mb: 8192,
            allocated_ram_mb: 1024,
            max_servers: 50,
        };
        let rendered = serde_json::to_string(&NodeResponse::from(node)).unwrap();
        assert!(!rendered.contains("node-secret"));
        assert!(rendered.contains("\"allocated_ram_mb\":1024"));
    }

    #[test]
    fn test_server_response_shape() {
        let server = Server {
            id: Uuid::nil(),
            user_id: "alice".to_string(),
            node_id: "a".to_string(),
            plan_id: "iron".to_string(),
            name: "survival".to_string(),
            port: 25565,
            ram_mb: 1024,
            cpu_limit: 1.0,
            disk_gb: 10,
            mc_version: "1.21.4".to_string(),
            server_type: ServerType::Vanilla,
            status: ServerStatus::Installing,
            lxc_ip: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(ServerResponse::from(server)).unwrap();
        assert_eq!(value["status"], "installing");
        assert_eq!(value["server_type"], "vanilla");
        assert_eq!(value["port"], 25565);
        // Absent container address is omitted, not null.
        assert!(value.get("lxc_ip").is_none());
    }

    #[test]
    fn test_create_request_defaults() {
        let body: CreateServerRequest =
            serde_json::from_str(r#"{"name":"survival","plan_id":"iron"}"#).unwrap();
        assert!(body.mc_version.is_none());
        assert!(body.server_type.is_none());
        assert!(body.port.is_none());
    }

    #[test]
    fn test_status_sync_request_parses() {
        let body: StatusSyncRequest =
            serde_json::from_str(r#"{"status":"running","lxc_ip":"10.10.0.7"}"#).unwrap();
        assert_eq!(body.status, "running");
        assert_eq!(body.lxc_ip.as_deref(), Some("10.10.0.7"));
    }
}
