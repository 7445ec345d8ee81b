use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent_gateway::{AgentApi, ProvisionRequest, ResizeRequest};
use crate::allocator::{self, MAX_PORT_ATTEMPTS};
use crate::config::LimitsConfig;
use crate::errors::{PanelError, PanelResult};
use crate::models::{
    Node, PowerAction, Server, ServerLog, ServerStatus, ServerType,
};
use crate::store::{DataStore, StoreError};

lazy_static! {
    static ref NAME_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.-]{1,30}[A-Za-z0-9]$").unwrap();
}

/// A create request after boundary validation, carrying the resolved
/// version string.
#[derive(Debug, Clone)]
pub struct CreateParams {
    pub name: String,
    pub plan_id: String,
    pub mc_version: String,
    pub server_type: ServerType,
    pub requested_port: Option<u16>,
}

/// Owns the server state machine and every orchestration path that may
/// move it: create, power, resize, delete (optimistic writes) and the
/// watchdog report (authoritative writes).
pub struct LifecycleManager {
    store: Arc<DataStore>,
    agent: Arc<dyn AgentApi>,
    max_servers_per_user: usize,
}

impl LifecycleManager {
    pub fn new(store: Arc<DataStore>, agent: Arc<dyn AgentApi>, limits: &LimitsConfig) -> Self {
        Self {
            store,
            agent,
            max_servers_per_user: limits.max_servers_per_user,
        }
    }

    /// The capacity-aware create flow. Allocation failures abort before any
    /// durable write; an agent failure after the commit downgrades the row
    /// to `error` and keeps the reservation for operator retry.
    pub async fn create_server(&self, user_id: &str, params: CreateParams) -> PanelResult<Server> {
        if !NAME_RE.is_match(&params.name) {
            return Err(PanelError::Validation(
                "name must be 3-32 characters (letters, digits, spaces, '_', '.', '-')".to_string(),
            ));
        }

        let plan = self
            .store
            .plan(&params.plan_id)
            .await
            .filter(|p| p.active)
            .ok_or(PanelError::PlanNotFound)?;

        if self.store.active_server_count(user_id).await >= self.max_servers_per_user {
            return Err(PanelError::ServerLimitReached);
        }

        let candidates = allocator::candidate_nodes(&self.store, plan.ram_mb).await;
        if candidates.is_empty() {
            return Err(PanelError::NoCapacityAvailable);
        }

        let mut committed: Option<(Server, Node)> = None;
        for node in candidates {
            let port = match allocator::pick_port(&self.store, &node.id, params.requested_port).await
            {
                Ok(port) => port,
                Err(err @ PanelError::Validation(_)) => return Err(err),
                Err(_) => continue,
            };

            let mut server = Server {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                node_id: node.id.clone(),
                plan_id: plan.id.clone(),
                name: params.name.clone(),
                port,
                ram_mb: plan.ram_mb,
                cpu_limit: plan.cpu_limit,
                disk_gb: plan.disk_gb,
                mc_version: params.mc_version.clone(),
                server_type: params.server_type,
                status: ServerStatus::Installing,
                lxc_ip: None,
                created_at: Utc::now(),
            };

            match allocator::insert_with_port_retry(&self.store, &mut server).await {
                Ok(()) => {
                    committed = Some((server, node));
                    break;
                }
                // The combinator only surfaces PortConflict once the
                // bounded attempts are spent.
                Err(StoreError::PortConflict) => {
                    return Err(PanelError::PortAllocationExhausted(MAX_PORT_ATTEMPTS));
                }
                // Lost a capacity race since candidate selection; fall
                // through to the next-least-loaded node.
                Err(StoreError::CapacityExceeded) | Err(StoreError::NodeMissing) => continue,
                Err(other) => return Err(other.into()),
            }
        }

        let Some((server, node)) = committed else {
            return Err(PanelError::NoCapacityAvailable);
        };

        info!(
            "Server {} allocated on node {} port {} ({} MB)",
            server.id, node.id, server.port, server.ram_mb
        );

        let provision = ProvisionRequest {
            server_id: server.id,
            name: server.name.clone(),
            ram_mb: server.ram_mb,
            cpu_limit: server.cpu_limit,
            disk_gb: server.disk_gb,
            port: server.port,
            mc_version: server.mc_version.clone(),
            server_type: server.server_type,
        };
        if let Err(e) = self.agent.create_server(&node, &provision).await {
            // Row and RAM reservation stay intact for operator retry.
            error!("Provisioning failed for server {}: {}", server.id, e);
            self.store.set_status(server.id, ServerStatus::Error).await?;
            return Err(PanelError::AgentUnreachable(format!("node {}", node.id)));
        }

        self.store
            .append_log(ServerLog::record(server.id, "create", user_id))
            .await;
        Ok(server)
    }

    /// start/stop/restart. The stored status only moves after the agent has
    /// acknowledged the call; a gateway failure leaves it untouched.
    pub async fn power_action(
        &self,
        user_id: &str,
        server_id: Uuid,
        action: PowerAction,
    ) -> PanelResult<Server> {
        let server = self.owned_server(user_id, server_id).await?;
        if server.status == ServerStatus::Suspended {
            return Err(PanelError::ServerSuspended);
        }
        let node = self.node_of(&server).await?;

        self.agent.power_action(&node, server.id, action).await?;

        let updated = self
            .store
            .set_status(server.id, action.optimistic_status())
            .await?;
        self.store
            .append_log(ServerLog::record(server.id, action.as_str(), user_id))
            .await;
        info!(
            "Server {} {} acknowledged by node {}, now {}",
            server.id,
            action.as_str(),
            node.id,
            updated.status.as_str()
        );
        Ok(updated)
    }

    /// Plan change. The row and ledger commit first; an unreachable agent
    /// never rolls them back (reconciliation arrives via the watchdog or
    /// operator retry).
    pub async fn resize_server(
        &self,
        user_id: &str,
        server_id: Uuid,
        plan_id: &str,
    ) -> PanelResult<Server> {
        let server = self.owned_server(user_id, server_id).await?;
        if server.status == ServerStatus::Suspended {
            return Err(PanelError::ServerSuspended);
        }
        let plan = self
            .store
            .plan(plan_id)
            .await
            .filter(|p| p.active)
            .ok_or(PanelError::PlanNotFound)?;
        let node = self.node_of(&server).await?;

        let updated = self.store.resize_server_record(server.id, &plan).await?;
        self.store
            .append_log(ServerLog::record(server.id, "resize", user_id))
            .await;

        let request = ResizeRequest {
            ram_mb: plan.ram_mb,
            cpu_limit: plan.cpu_limit,
            disk_gb: plan.disk_gb,
            plan: plan.name.clone(),
        };
        if let Err(e) = self.agent.resize_server(&node, server.id, &request).await {
            warn!(
                "Resize committed for server {} but node {} is unreachable: {}",
                server.id, node.id, e
            );
            return Err(PanelError::AgentUnreachable(format!("node {}", node.id)));
        }
        Ok(updated)
    }

    /// Delete, permitted from any state except running/starting. The agent
    /// call precedes the row removal, so an unreachable agent leaves
    /// everything intact for a later retry.
    pub async fn delete_server(&self, user_id: &str, server_id: Uuid) -> PanelResult<()> {
        let server = self.owned_server(user_id, server_id).await?;
        if server.status.blocks_delete() {
            return Err(PanelError::ServerBusy);
        }
        let node = self.node_of(&server).await?;

        self.agent.delete_server(&node, server.id).await?;

        self.store.release_server_record(server.id).await;
        self.store
            .append_log(ServerLog::record(server.id, "delete", user_id))
            .await;
        info!("Server {} deleted from node {}", server.id, node.id);
        Ok(())
    }

    /// Authoritative correction from a node watchdog. This is the only
    /// channel for `installing -> running|error` and `stopping -> stopped`.
    pub async fn apply_status_report(
        &self,
        node_id: &str,
        server_id: Uuid,
        status: &str,
        lxc_ip: Option<String>,
    ) -> PanelResult<Server> {
        let status = ServerStatus::parse(status)?;
        if !status.reportable_by_watchdog() {
            return Err(PanelError::InvalidStatus(status.as_str().to_string()));
        }

        let server = self
            .store
            .server(server_id)
            .await
            .ok_or_else(|| PanelError::NotFound("server".to_string()))?;
        if server.node_id != node_id {
            // Cross-node spoofing: the credential is valid for some node,
            // just not the one owning this server.
            return Err(PanelError::Unauthorized);
        }

        let updated = self
            .store
            .apply_status_report(server_id, status, lxc_ip)
            .await?;
        info!(
            "Watchdog on node {} moved server {} to {}",
            node_id,
            server_id,
            status.as_str()
        );
        Ok(updated)
    }

    pub async fn owned_server(&self, user_id: &str, server_id: Uuid) -> PanelResult<Server> {
        // Not-owned and absent are indistinguishable to the caller.
        self.store
            .server(server_id)
            .await
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| PanelError::NotFound("server".to_string()))
    }

    pub async fn node_of(&self, server: &Server) -> PanelResult<Node> {
        self.store
            .node(&server.node_id)
            .await
            .ok_or_else(|| PanelError::NotFound("node".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeStatus, Plan};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct ScriptedAgent {
        fail_create: bool,
        fail_power: bool,
        fail_delete: bool,
        fail_resize: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn refuse(&self, node: &Node) -> PanelError {
            PanelError::AgentUnreachable(format!("node {}", node.id))
        }
    }

    #[async_trait]
    impl AgentApi for ScriptedAgent {
        async fn create_server(&self, node: &Node, request: &ProvisionRequest) -> PanelResult<()> {
            self.calls
                .lock()
                .push(format!("create:{}:{}", node.id, request.port));
            if self.fail_create {
                return Err(self.refuse(node));
            }
            Ok(())
        }

        async fn power_action(
            &self,
            node: &Node,
            server_id: Uuid,
            action: PowerAction,
        ) -> PanelResult<()> {
            self.calls
                .lock()
                .push(format!("{}:{}", action.as_str(), server_id));
            if self.fail_power {
                return Err(self.refuse(node));
            }
            Ok(())
        }

        async fn resize_server(
            &self,
            node: &Node,
            server_id: Uuid,
            _request: &ResizeRequest,
        ) -> PanelResult<()> {
            self.calls.lock().push(format!("resize:{}", server_id));
            if self.fail_resize {
                return Err(self.refuse(node));
            }
            Ok(())
        }

        async fn delete_server(&self, node: &Node, server_id: Uuid) -> PanelResult<()> {
            self.calls.lock().push(format!("delete:{}", server_id));
            if self.fail_delete {
                return Err(self.refuse(node));
            }
            Ok(())
        }

        async fn fetch_metrics(&self, _node: &Node, _server_id: Uuid) -> PanelResult<Value> {
            Ok(json!({ "cpu": 0.0 }))
        }

        async fn fetch_properties(&self, _node: &Node, _server_id: Uuid) -> PanelResult<String> {
            Ok(String::new())
        }

        async fn put_properties(
            &self,
            _node: &Node,
            _server_id: Uuid,
            _body: Bytes,
        ) -> PanelResult<()> {
            Ok(())
        }
    }

    fn node(id: &str, total: u64) -> Node {
        Node {
            id: id.to_string(),
            address: "10.0.0.1".to_string(),
            agent_port: 8080,
            secret: format!("{}-secret", id),
            status: NodeStatus::Online,
            total_ram_mb: total,
            allocated_ram_mb: 0,
            max_servers: 50,
        }
    }

    fn plan(id: &str, ram: u64) -> Plan {
        Plan {
            id: id.to_string(),
            name: id.to_string(),
            price_cents: 500,
            ram_mb: ram,
            cpu_limit: 1.0,
            disk_gb: 10,
            active: true,
        }
    }

    fn params(plan_id: &str) -> CreateParams {
        CreateParams {
            name: "my server".to_string(),
            plan_id: plan_id.to_string(),
            mc_version: "1.21.4".to_string(),
            server_type: ServerType::Vanilla,
            requested_port: None,
        }
    }

    fn manager(
        nodes: Vec<Node>,
        plans: Vec<Plan>,
        agent: ScriptedAgent,
    ) -> (Arc<DataStore>, Arc<ScriptedAgent>, LifecycleManager) {
        let store = Arc::new(DataStore::in_memory(nodes, plans));
        let agent = Arc::new(agent);
        let lifecycle = LifecycleManager::new(
            store.clone(),
            agent.clone(),
            &LimitsConfig::default(),
        );
        (store, agent, lifecycle)
    }

    #[tokio::test]
    async fn test_create_reserves_capacity_end_to_end() {
        let (store, agent, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );

        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        assert_eq!(server.status, ServerStatus::Installing);
        assert_eq!(server.port, 25565);
        assert_eq!(server.ram_mb, 1024);
        assert_eq!(store.node("a").await.unwrap().allocated_ram_mb, 1024);
        assert_eq!(agent.calls(), vec!["create:a:25565".to_string()]);
    }

    #[tokio::test]
    async fn test_create_agent_failure_preserves_row_and_reservation() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::failing_create(),
        );

        let err = lifecycle
            .create_server("alice", params("iron"))
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::AgentUnreachable(_)));

        let rows = store.servers_for_user("alice").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ServerStatus::Error);
        // The reservation is deliberately not rolled back.
        assert_eq!(store.node("a").await.unwrap().allocated_ram_mb, 1024);
    }

    #[tokio::test]
    async fn test_create_rejects_at_server_ceiling() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 65536)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );

        for _ in 0..5 {
            lifecycle.create_server("alice", params("iron")).await.unwrap();
        }
        let err = lifecycle
            .create_server("alice", params("iron"))
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::ServerLimitReached));

        // Error rows do not count toward the ceiling.
        let victim = store.servers_for_user("alice").await[0].id;
        store.set_status(victim, ServerStatus::Error).await.unwrap();
        lifecycle.create_server("alice", params("iron")).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_without_online_nodes() {
        let mut offline = node("a", 4096);
        offline.status = NodeStatus::Offline;
        let (_, _, lifecycle) = manager(
            vec![offline],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        assert!(matches!(
            lifecycle.create_server("alice", params("iron")).await,
            Err(PanelError::NoCapacityAvailable)
        ));
    }

    #[tokio::test]
    async fn test_create_validates_name_and_plan() {
        let (_, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );

        let mut short = params("iron");
        short.name = "ab".to_string();
        assert!(matches!(
            lifecycle.create_server("alice", short).await,
            Err(PanelError::Validation(_))
        ));

        let mut long = params("iron");
        long.name = "x".repeat(33);
        assert!(matches!(
            lifecycle.create_server("alice", long).await,
            Err(PanelError::Validation(_))
        ));

        assert!(matches!(
            lifecycle.create_server("alice", params("gold")).await,
            Err(PanelError::PlanNotFound)
        ));
    }

    #[tokio::test]
    async fn test_create_skips_node_without_headroom() {
        // "small" sorts first by allocation but cannot host the plan.
        let mut small = node("small", 512);
        small.allocated_ram_mb = 0;
        let mut big = node("zbig", 8192);
        big.allocated_ram_mb = 256;
        let (_, agent, lifecycle) = manager(
            vec![small, big],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );

        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        assert_eq!(server.node_id, "zbig");
        assert_eq!(agent.calls(), vec!["create:zbig:25565".to_string()]);
    }

    #[tokio::test]
    async fn test_competing_creates_land_on_adjacent_ports() {
        let (_, _, lifecycle) = manager(
            vec![node("a", 8192)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );

        let mut first = params("iron");
        first.requested_port = Some(25565);
        let mut second = params("iron");
        second.requested_port = Some(25565);

        let one = lifecycle.create_server("alice", first).await.unwrap();
        let two = lifecycle.create_server("bob", second).await.unwrap();
        assert_eq!(one.port, 25565);
        assert_eq!(two.port, 25566);
    }

    #[tokio::test]
    async fn test_power_confirmed_then_optimistic() {
        let (store, agent, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        store
            .apply_status_report(server.id, ServerStatus::Running, None)
            .await
            .unwrap();

        let updated = lifecycle
            .power_action("alice", server.id, PowerAction::Stop)
            .await
            .unwrap();
        assert_eq!(updated.status, ServerStatus::Stopping);
        assert!(agent.calls().contains(&format!("stop:{}", server.id)));
    }

    #[tokio::test]
    async fn test_power_failure_leaves_status_untouched() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent {
                fail_power: true,
                ..Default::default()
            },
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        store
            .apply_status_report(server.id, ServerStatus::Stopped, None)
            .await
            .unwrap();

        let err = lifecycle
            .power_action("alice", server.id, PowerAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::AgentUnreachable(_)));
        assert_eq!(
            store.server(server.id).await.unwrap().status,
            ServerStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_power_rejected_while_suspended() {
        let (store, agent, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        store
            .set_status(server.id, ServerStatus::Suspended)
            .await
            .unwrap();
        agent.calls.lock().clear();

        for action in [PowerAction::Start, PowerAction::Stop, PowerAction::Restart] {
            let err = lifecycle
                .power_action("alice", server.id, action)
                .await
                .unwrap_err();
            assert!(matches!(err, PanelError::ServerSuspended));
        }
        // The agent was never consulted.
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_power_scoped_to_owner() {
        let (_, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        assert!(matches!(
            lifecycle
                .power_action("mallory", server.id, PowerAction::Start)
                .await,
            Err(PanelError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_blocked_while_active() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();

        for status in [ServerStatus::Running, ServerStatus::Starting] {
            store.set_status(server.id, status).await.unwrap();
            assert!(matches!(
                lifecycle.delete_server("alice", server.id).await,
                Err(PanelError::ServerBusy)
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_frees_exact_reservation() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024), plan("dust", 512)],
            ScriptedAgent::default(),
        );
        let keep = lifecycle.create_server("alice", params("dust")).await.unwrap();
        let doomed = lifecycle.create_server("alice", params("iron")).await.unwrap();
        store
            .apply_status_report(doomed.id, ServerStatus::Stopped, None)
            .await
            .unwrap();

        lifecycle.delete_server("alice", doomed.id).await.unwrap();
        assert_eq!(store.node("a").await.unwrap().allocated_ram_mb, keep.ram_mb);
        assert!(store.server(doomed.id).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_agent_failure_keeps_row() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent {
                fail_delete: true,
                ..Default::default()
            },
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        store
            .apply_status_report(server.id, ServerStatus::Stopped, None)
            .await
            .unwrap();

        let err = lifecycle
            .delete_server("alice", server.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::AgentUnreachable(_)));
        assert!(store.server(server.id).await.is_some());
        assert_eq!(store.node("a").await.unwrap().allocated_ram_mb, 1024);
    }

    #[tokio::test]
    async fn test_resize_commit_survives_agent_failure() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024), plan("gold", 2048)],
            ScriptedAgent {
                fail_resize: true,
                ..Default::default()
            },
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();

        let err = lifecycle
            .resize_server("alice", server.id, "gold")
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::AgentUnreachable(_)));
        // Committed, not rolled back.
        let row = store.server(server.id).await.unwrap();
        assert_eq!(row.ram_mb, 2048);
        assert_eq!(store.node("a").await.unwrap().allocated_ram_mb, 2048);
    }

    #[tokio::test]
    async fn test_watchdog_cross_node_spoof_rejected() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096), node("b", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();
        assert_eq!(server.node_id, "a");

        let err = lifecycle
            .apply_status_report("b", server.id, "running", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::Unauthorized));
        assert_eq!(
            store.server(server.id).await.unwrap().status,
            ServerStatus::Installing
        );
    }

    #[tokio::test]
    async fn test_watchdog_applies_running_and_address() {
        let (store, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();

        lifecycle
            .apply_status_report("a", server.id, "running", Some("10.10.0.7".to_string()))
            .await
            .unwrap();
        let row = store.server(server.id).await.unwrap();
        assert_eq!(row.status, ServerStatus::Running);
        assert_eq!(row.lxc_ip.as_deref(), Some("10.10.0.7"));
    }

    #[tokio::test]
    async fn test_watchdog_rejects_unknown_and_installing() {
        let (_, _, lifecycle) = manager(
            vec![node("a", 4096)],
            vec![plan("iron", 1024)],
            ScriptedAgent::default(),
        );
        let server = lifecycle.create_server("alice", params("iron")).await.unwrap();

        assert!(matches!(
            lifecycle
                .apply_status_report("a", server.id, "exploded", None)
                .await,
            Err(PanelError::InvalidStatus(_))
        ));
        assert!(matches!(
            lifecycle
                .apply_status_report("a", server.id, "installing", None)
                .await,
            Err(PanelError::InvalidStatus(_))
        ));
    }
}
