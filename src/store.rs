use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{PanelError, PanelResult};
use crate::models::{Node, NodeStatus, Plan, Server, ServerLog, ServerStatus};

const SNAPSHOT_FILE: &str = "panel-state.json";
const MAX_LOG_ENTRIES: usize = 5000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The (node, port) pair is already bound. The create flow retries this
    /// one with a bumped candidate; everything else aborts.
    #[error("port already bound on node")]
    PortConflict,

    #[error("node capacity exceeded")]
    CapacityExceeded,

    #[error("node does not exist")]
    NodeMissing,

    #[error("server does not exist")]
    ServerMissing,
}

impl From<StoreError> for PanelError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PortConflict => PanelError::Validation("port already in use".to_string()),
            StoreError::CapacityExceeded => PanelError::NoCapacityAvailable,
            StoreError::NodeMissing => PanelError::NotFound("node".to_string()),
            StoreError::ServerMissing => PanelError::NotFound("server".to_string()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    nodes: Vec<Node>,
    servers: Vec<Server>,
    #[serde(default)]
    logs: Vec<ServerLog>,
}

struct StoreInner {
    nodes: HashMap<String, Node>,
    servers: HashMap<Uuid, Server>,
    plans: HashMap<String, Plan>,
    logs: VecDeque<ServerLog>,
}

/// Capacity ledger plus durable server records. One write lock is the
/// serialization point for every allocation decision; a JSON snapshot under
/// the data dir carries state across restarts.
pub struct DataStore {
    inner: RwLock<StoreInner>,
    snapshot_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl DataStore {
    /// Load the snapshot (if any), then overlay the administratively
    /// configured nodes and plans. Snapshot-only nodes are kept but marked
    /// offline so existing servers stay addressable without admitting new
    /// ones.
    pub async fn open(data_dir: &Path, nodes: Vec<Node>, plans: Vec<Plan>) -> PanelResult<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let snapshot_path = data_dir.join(SNAPSHOT_FILE);
        let snapshot = match tokio::fs::read(&snapshot_path).await {
            Ok(raw) => serde_json::from_slice::<Snapshot>(&raw)
                .map_err(|e| PanelError::Persistence(format!("corrupt snapshot: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        let store = Self::assemble(snapshot, nodes, plans, Some(snapshot_path));
        let corrected = store.reconcile_capacity().await;
        if corrected > 0 {
            info!("Capacity ledger reconciled on load ({} nodes adjusted)", corrected);
        }
        Ok(store)
    }

    /// Ephemeral store without a snapshot file.
    pub fn in_memory(nodes: Vec<Node>, plans: Vec<Plan>) -> Self {
        Self::assemble(Snapshot::default(), nodes, plans, None)
    }

    fn assemble(
        snapshot: Snapshot,
        config_nodes: Vec<Node>,
        plans: Vec<Plan>,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        let mut nodes: HashMap<String, Node> = HashMap::new();
        for mut node in snapshot.nodes {
            node.status = NodeStatus::Offline;
            nodes.insert(node.id.clone(), node);
        }
        for node in config_nodes {
            // Config is authoritative for everything except the ledger
            // counter, which reconciliation recomputes from server rows.
            nodes.insert(node.id.clone(), node);
        }

        let servers = snapshot
            .servers
            .into_iter()
            .map(|s| (s.id, s))
            .collect::<HashMap<_, _>>();
        let mut logs: VecDeque<ServerLog> = snapshot.logs.into();
        while logs.len() > MAX_LOG_ENTRIES {
            logs.pop_front();
        }

        Self {
            inner: RwLock::new(StoreInner {
                nodes,
                servers,
                plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
                logs,
            }),
            snapshot_path,
            persist_lock: Mutex::new(()),
        }
    }

    // Reads ------------------------------------------------------------

    pub async fn node(&self, id: &str) -> Option<Node> {
        self.inner.read().await.nodes.get(id).cloned()
    }

    pub async fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.inner.read().await.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub async fn online_nodes(&self) -> Vec<Node> {
        self.inner
            .read()
            .await
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Online)
            .cloned()
            .collect()
    }

    pub async fn node_by_secret(&self, secret: &str) -> Option<Node> {
        if secret.is_empty() {
            return None;
        }
        self.inner
            .read()
            .await
            .nodes
            .values()
            .find(|n| n.secret == secret)
            .cloned()
    }

    pub async fn plan(&self, id: &str) -> Option<Plan> {
        self.inner.read().await.plans.get(id).cloned()
    }

    pub async fn server(&self, id: Uuid) -> Option<Server> {
        self.inner.read().await.servers.get(&id).cloned()
    }

    pub async fn servers_for_user(&self, user_id: &str) -> Vec<Server> {
        let mut servers: Vec<Server> = self
            .inner
            .read()
            .await
            .servers
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        servers.sort_by_key(|s| s.created_at);
        servers
    }

    /// Servers counting toward the per-user ceiling. `error` rows are
    /// excluded so users can retry after a failed provision.
    pub async fn active_server_count(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .await
            .servers
            .values()
            .filter(|s| s.user_id == user_id && s.status != ServerStatus::Error)
            .count()
    }

    pub async fn server_count_on_node(&self, node_id: &str) -> usize {
        self.inner
            .read()
            .await
            .servers
            .values()
            .filter(|s| s.node_id == node_id)
            .count()
    }

    pub async fn ports_on_node(&self, node_id: &str) -> HashSet<u16> {
        self.inner
            .read()
            .await
            .servers
            .values()
            .filter(|s| s.node_id == node_id)
            .map(|s| s.port)
            .collect()
    }

    pub async fn port_free_everywhere(&self, port: u16) -> bool {
        !self
            .inner
            .read()
            .await
            .servers
            .values()
            .any(|s| s.port == port)
    }

    // Writes ------------------------------------------------------------

    /// Insert a server row and reserve its RAM on the owning node in one
    /// locked step. The (node, port) uniqueness check here is the real
    /// arbiter behind the advisory port probe.
    pub async fn create_server_record(&self, server: &Server) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write().await;

            let occupied = inner
                .servers
                .values()
                .any(|s| s.node_id == server.node_id && s.port == server.port);
            if occupied {
                return Err(StoreError::PortConflict);
            }

            let on_node = inner
                .servers
                .values()
                .filter(|s| s.node_id == server.node_id)
                .count();

            let node = inner
                .nodes
                .get_mut(&server.node_id)
                .ok_or(StoreError::NodeMissing)?;
            if on_node >= node.max_servers
                || node.allocated_ram_mb + server.ram_mb > node.total_ram_mb
            {
                return Err(StoreError::CapacityExceeded);
            }

            node.allocated_ram_mb += server.ram_mb;
            inner.servers.insert(server.id, server.clone());
        }
        self.persist().await;
        Ok(())
    }

    /// Optimistic transition (power actions, provisioning failure).
    pub async fn set_status(&self, id: Uuid, status: ServerStatus) -> PanelResult<Server> {
        let updated = {
            let mut inner = self.inner.write().await;
            let server = inner
                .servers
                .get_mut(&id)
                .ok_or_else(|| PanelError::NotFound("server".to_string()))?;
            server.status = status;
            server.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Authoritative transition from a node watchdog.
    pub async fn apply_status_report(
        &self,
        id: Uuid,
        status: ServerStatus,
        lxc_ip: Option<String>,
    ) -> PanelResult<Server> {
        let updated = {
            let mut inner = self.inner.write().await;
            let server = inner
                .servers
                .get_mut(&id)
                .ok_or_else(|| PanelError::NotFound("server".to_string()))?;
            server.status = status;
            if lxc_ip.is_some() {
                server.lxc_ip = lxc_ip;
            }
            server.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Swap the row's resource snapshot for a new plan and move the ledger
    /// by the RAM delta. Growth is headroom-checked; shrink re-reads the
    /// current counter and clamps at zero.
    pub async fn resize_server_record(&self, id: Uuid, plan: &Plan) -> Result<Server, StoreError> {
        let updated = {
            let mut inner = self.inner.write().await;
            let (old_ram, node_id) = match inner.servers.get(&id) {
                Some(server) => (server.ram_mb, server.node_id.clone()),
                None => return Err(StoreError::ServerMissing),
            };

            let node = inner.nodes.get_mut(&node_id).ok_or(StoreError::NodeMissing)?;
            if plan.ram_mb > old_ram {
                let growth = plan.ram_mb - old_ram;
                if node.allocated_ram_mb + growth > node.total_ram_mb {
                    return Err(StoreError::CapacityExceeded);
                }
                node.allocated_ram_mb += growth;
            } else {
                node.allocated_ram_mb = node.allocated_ram_mb.saturating_sub(old_ram - plan.ram_mb);
            }

            // The row cannot vanish while the write lock is held.
            let server = inner.servers.get_mut(&id).expect("row present under lock");
            server.plan_id = plan.id.clone();
            server.ram_mb = plan.ram_mb;
            server.cpu_limit = plan.cpu_limit;
            server.disk_gb = plan.disk_gb;
            server.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Remove a server row and free exactly its RAM, re-reading the current
    /// counter under the write lock and clamping at zero.
    pub async fn release_server_record(&self, id: Uuid) -> Option<Server> {
        let removed = {
            let mut inner = self.inner.write().await;
            let server = inner.servers.remove(&id)?;
            if let Some(node) = inner.nodes.get_mut(&server.node_id) {
                node.allocated_ram_mb = node.allocated_ram_mb.saturating_sub(server.ram_mb);
            }
            Some(server)
        };
        if removed.is_some() {
            self.persist().await;
        }
        removed
    }

    pub async fn append_log(&self, log: ServerLog) {
        {
            let mut inner = self.inner.write().await;
            inner.logs.push_back(log);
            while inner.logs.len() > MAX_LOG_ENTRIES {
                inner.logs.pop_front();
            }
        }
        self.persist().await;
    }

    /// Recompute every node's ledger counter from its server rows. Heals
    /// drift from snapshot hand-edits or interrupted shutdowns. Returns the
    /// number of nodes whose counter changed.
    pub async fn reconcile_capacity(&self) -> usize {
        let corrected = {
            let mut inner = self.inner.write().await;
            let mut usage: HashMap<String, u64> = HashMap::new();
            for server in inner.servers.values() {
                *usage.entry(server.node_id.clone()).or_default() += server.ram_mb;
            }

            let mut corrected = 0;
            for node in inner.nodes.values_mut() {
                let actual = usage.get(&node.id).copied().unwrap_or(0);
                if node.allocated_ram_mb != actual {
                    warn!(
                        "Node {} ledger drift: recorded {} MB, actual {} MB",
                        node.id, node.allocated_ram_mb, actual
                    );
                    node.allocated_ram_mb = actual;
                    corrected += 1;
                }
                if node.allocated_ram_mb > node.total_ram_mb {
                    warn!(
                        "Node {} is overcommitted: {} MB allocated of {} MB",
                        node.id, node.allocated_ram_mb, node.total_ram_mb
                    );
                }
            }
            corrected
        };
        if corrected > 0 {
            self.persist().await;
        }
        corrected
    }

    /// Best-effort snapshot write. The in-memory record is the commit
    /// point; a failed write is logged and retried on the next mutation.
    async fn persist(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let inner = self.inner.read().await;
            Snapshot {
                nodes: inner.nodes.values().cloned().collect(),
                servers: inner.servers.values().cloned().collect(),
                logs: inner.logs.iter().cloned().collect(),
            }
        };
        let raw = match serde_json::to_vec_pretty(&snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize state snapshot: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, raw).await {
            warn!("Failed to write state snapshot: {}", e);
        }
    }
}
