use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{Node, Plan};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PanelConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub secret: String,
    pub admin_token: String,
    pub data_dir: PathBuf,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("secret", &"[REDACTED]")
            .field("admin_token", &"[REDACTED]")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    pub max_servers_per_user: usize,
    pub creates_per_hour: u32,
    pub power_actions_per_minute: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_servers_per_user: 5,
            creates_per_hour: 5,
            power_actions_per_minute: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub id: String,
    pub address: String,
    pub agent_port: u16,
    pub secret: String,
    pub total_ram_mb: u64,
    #[serde(default = "default_max_servers")]
    pub max_servers: usize,
}

fn default_max_servers() -> usize {
    50
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("agent_port", &self.agent_port)
            .field("secret", &"[REDACTED]")
            .field("total_ram_mb", &self.total_ram_mb)
            .field("max_servers", &self.max_servers)
            .finish()
    }
}

impl NodeConfig {
    pub fn into_node(self) -> Node {
        Node {
            id: self.id,
            address: self.address,
            agent_port: self.agent_port,
            secret: self.secret,
            status: Default::default(),
            total_ram_mb: self.total_ram_mb,
            allocated_ram_mb: 0,
            max_servers: self.max_servers,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlanConfig {
    pub id: String,
    pub name: String,
    pub price_cents: u32,
    pub ram_mb: u64,
    pub cpu_limit: f64,
    pub disk_gb: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl PlanConfig {
    pub fn into_plan(self) -> Plan {
        Plan {
            id: self.id,
            name: self.name,
            price_cents: self.price_cents,
            ram_mb: self.ram_mb,
            cpu_limit: self.cpu_limit,
            disk_gb: self.disk_gb,
            active: self.active,
        }
    }
}

impl PanelConfig {
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerConfig {
                bind_addr: std::env::var("PANEL_BIND_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
                secret: std::env::var("PANEL_SECRET")
                    .map_err(|_| "PANEL_SECRET not set".to_string())?,
                admin_token: std::env::var("PANEL_ADMIN_TOKEN")
                    .map_err(|_| "PANEL_ADMIN_TOKEN not set".to_string())?,
                data_dir: PathBuf::from(
                    std::env::var("DATA_DIR").unwrap_or_else(|_| "/var/lib/catalyst-panel".to_string()),
                ),
            },
            limits: LimitsConfig::default(),
            logging: LoggingConfig {
                level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                format: "json".to_string(),
            },
            nodes: Vec::new(),
            plans: Vec::new(),
        })
    }
}
