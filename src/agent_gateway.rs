use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as WsRequest;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{PanelError, PanelResult};
use crate::models::{Node, PowerAction, ServerType};

const AGENT_TIMEOUT: Duration = Duration::from_secs(15);
const AGENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub server_id: Uuid,
    pub name: String,
    pub ram_mb: u64,
    pub cpu_limit: f64,
    pub disk_gb: u64,
    pub port: u16,
    pub mc_version: String,
    pub server_type: ServerType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub ram_mb: u64,
    pub cpu_limit: f64,
    pub disk_gb: u64,
    pub plan: String,
}

/// Typed client surface of a node's local agent. A trait so lifecycle
/// orchestration can run against a scripted agent in tests.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn create_server(&self, node: &Node, request: &ProvisionRequest) -> PanelResult<()>;
    async fn power_action(
        &self,
        node: &Node,
        server_id: Uuid,
        action: PowerAction,
    ) -> PanelResult<()>;
    async fn resize_server(
        &self,
        node: &Node,
        server_id: Uuid,
        request: &ResizeRequest,
    ) -> PanelResult<()>;
    async fn delete_server(&self, node: &Node, server_id: Uuid) -> PanelResult<()>;
    async fn fetch_metrics(&self, node: &Node, server_id: Uuid) -> PanelResult<Value>;
    async fn fetch_properties(&self, node: &Node, server_id: Uuid) -> PanelResult<String>;
    async fn put_properties(&self, node: &Node, server_id: Uuid, body: Bytes) -> PanelResult<()>;
}

/// HTTP client bound to whichever node a call names, bearer-authenticated
/// with that node's agent secret. Every transport failure, timeout, or
/// non-2xx collapses to `AgentUnreachable`; callers decide local fallout.
/// No retries here; retry policy belongs to the caller.
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(AGENT_TIMEOUT)
            .connect_timeout(AGENT_CONNECT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    fn unreachable(node: &Node, detail: impl std::fmt::Display) -> PanelError {
        // Log the node, never its credential.
        warn!("Agent call to node {} failed: {}", node.id, detail);
        PanelError::AgentUnreachable(format!("node {}", node.id))
    }

    async fn expect_ok(node: &Node, response: reqwest::Response) -> PanelResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Self::unreachable(node, format!("agent returned {}", status)))
        }
    }
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentApi for HttpAgentClient {
    async fn create_server(&self, node: &Node, request: &ProvisionRequest) -> PanelResult<()> {
        let response = self
            .client
            .post(format!("{}/servers/create", node.agent_base_url()))
            .bearer_auth(&node.secret)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response).await?;
        Ok(())
    }

    async fn power_action(
        &self,
        node: &Node,
        server_id: Uuid,
        action: PowerAction,
    ) -> PanelResult<()> {
        let response = self
            .client
            .post(format!(
                "{}/servers/{}/{}",
                node.agent_base_url(),
                server_id,
                action.as_str()
            ))
            .bearer_auth(&node.secret)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response).await?;
        Ok(())
    }

    async fn resize_server(
        &self,
        node: &Node,
        server_id: Uuid,
        request: &ResizeRequest,
    ) -> PanelResult<()> {
        let response = self
            .client
            .post(format!(
                "{}/servers/{}/resize",
                node.agent_base_url(),
                server_id
            ))
            .bearer_auth(&node.secret)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response).await?;
        Ok(())
    }

    async fn delete_server(&self, node: &Node, server_id: Uuid) -> PanelResult<()> {
        let response = self
            .client
            .delete(format!("{}/servers/{}", node.agent_base_url(), server_id))
            .bearer_auth(&node.secret)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response).await?;
        Ok(())
    }

    async fn fetch_metrics(&self, node: &Node, server_id: Uuid) -> PanelResult<Value> {
        let response = self
            .client
            .get(format!(
                "{}/servers/{}/metrics",
                node.agent_base_url(),
                server_id
            ))
            .bearer_auth(&node.secret)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::unreachable(node, e))
    }

    async fn fetch_properties(&self, node: &Node, server_id: Uuid) -> PanelResult<String> {
        let response = self
            .client
            .get(format!(
                "{}/servers/{}/properties",
                node.agent_base_url(),
                server_id
            ))
            .bearer_auth(&node.secret)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response)
            .await?
            .text()
            .await
            .map_err(|e| Self::unreachable(node, e))
    }

    async fn put_properties(&self, node: &Node, server_id: Uuid, body: Bytes) -> PanelResult<()> {
        let response = self
            .client
            .put(format!(
                "{}/servers/{}/properties",
                node.agent_base_url(),
                server_id
            ))
            .bearer_auth(&node.secret)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;
        Self::expect_ok(node, response).await?;
        Ok(())
    }
}

/// Upgrade request for the agent-side console socket, carrying the
/// node-scoped secret (never the user's token).
pub fn console_request(node: &Node, server_id: Uuid) -> PanelResult<WsRequest> {
    let mut request = node
        .console_url(server_id)
        .into_client_request()
        .map_err(|e| PanelError::AgentUnreachable(format!("node {}: {}", node.id, e)))?;
    let bearer = format!("Bearer {}", node.secret);
    let value = bearer
        .parse()
        .map_err(|_| PanelError::AgentUnreachable(format!("node {}: bad credential", node.id)))?;
    request
        .headers_mut()
        .insert(tokio_tungstenite::tungstenite::http::header::AUTHORIZATION, value);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeStatus;

    fn node() -> Node {
        Node {
            id: "node-a".to_string(),
            address: "10.0.0.5".to_string(),
            agent_port: 8080,
            secret: "node-secret".to_string(),
            status: NodeStatus::Online,
            total_ram_mb: 8192,
            allocated_ram_mb: 0,
            max_servers: 50,
        }
    }

    #[test]
    fn test_console_request_targets_agent() {
        let id = Uuid::new_v4();
        let request = console_request(&node(), id).unwrap();
        assert_eq!(
            request.uri().to_string(),
            format!("ws://10.0.0.5:8080/servers/{}/console", id)
        );
        let auth = request
            .headers()
            .get(tokio_tungstenite::tungstenite::http::header::AUTHORIZATION)
            .unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer node-secret");
    }

    #[test]
    fn test_wire_protocol_is_camel_case() {
        let request = ProvisionRequest {
            server_id: Uuid::nil(),
            name: "survival".to_string(),
            ram_mb: 1024,
            cpu_limit: 1.0,
            disk_gb: 10,
            port: 25565,
            mc_version: "1.21.4".to_string(),
            server_type: ServerType::Vanilla,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("serverId").is_some());
        assert!(value.get("ramMb").is_some());
        assert!(value.get("mcVersion").is_some());
        assert_eq!(value["serverType"], "vanilla");
    }
}
