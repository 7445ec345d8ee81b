use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PanelError;

/// Minecraft version used when a create request omits one.
pub const DEFAULT_MC_VERSION: &str = "1.21.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    Draining,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Online
    }
}

/// A physical/virtual host running a catalyst agent. `allocated_ram_mb` is
/// the capacity ledger counter; only the store mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub address: String,
    pub agent_port: u16,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub secret: String,
    #[serde(default)]
    pub status: NodeStatus,
    pub total_ram_mb: u64,
    #[serde(default)]
    pub allocated_ram_mb: u64,
    pub max_servers: usize,
}

impl Node {
    pub fn agent_base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.agent_port)
    }

    pub fn console_url(&self, server_id: Uuid) -> String {
        format!(
            "ws://{}:{}/servers/{}/console",
            self.address, self.agent_port, server_id
        )
    }
}

/// Immutable catalog row. Resource fields are snapshotted into Server rows
/// at create/resize time, so later catalog edits never touch provisioned
/// servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price_cents: u32,
    pub ram_mb: u64,
    pub cpu_limit: f64,
    pub disk_gb: u64,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Installing,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Suspended,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Installing => "installing",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Error => "error",
            ServerStatus::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Result<Self, PanelError> {
        match value {
            "installing" => Ok(ServerStatus::Installing),
            "starting" => Ok(ServerStatus::Starting),
            "running" => Ok(ServerStatus::Running),
            "stopping" => Ok(ServerStatus::Stopping),
            "stopped" => Ok(ServerStatus::Stopped),
            "error" => Ok(ServerStatus::Error),
            "suspended" => Ok(ServerStatus::Suspended),
            other => Err(PanelError::InvalidStatus(other.to_string())),
        }
    }

    /// Statuses a node watchdog may report. `installing` is set by the
    /// create flow only and never accepted inbound.
    pub fn reportable_by_watchdog(&self) -> bool {
        !matches!(self, ServerStatus::Installing)
    }

    /// Deletion is forbidden while the container may still be live.
    pub fn blocks_delete(&self) -> bool {
        matches!(self, ServerStatus::Running | ServerStatus::Starting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Vanilla,
}

impl Default for ServerType {
    fn default() -> Self {
        ServerType::Vanilla
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
}

impl PowerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Restart => "restart",
        }
    }

    /// The status the panel claims optimistically once the agent has
    /// acknowledged the call. `installing -> running` and
    /// `stopping -> stopped` are reserved for the watchdog path.
    pub fn optimistic_status(&self) -> ServerStatus {
        match self {
            PowerAction::Start | PowerAction::Restart => ServerStatus::Starting,
            PowerAction::Stop => ServerStatus::Stopping,
        }
    }
}

/// A provisioned game-server instance, bound to exactly one node and one
/// port. Resource fields are a snapshot of the plan at create/resize time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    pub user_id: String,
    pub node_id: String,
    pub plan_id: String,
    pub name: String,
    pub port: u16,
    pub ram_mb: u64,
    pub cpu_limit: f64,
    pub disk_gb: u64,
    pub mc_version: String,
    pub server_type: ServerType,
    pub status: ServerStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lxc_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry. Written on every user-triggered action, never
/// read back by the panel itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLog {
    pub id: Uuid,
    pub server_id: Uuid,
    pub action: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl ServerLog {
    pub fn record(server_id: Uuid, action: &str, user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            server_id,
            action: action.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
