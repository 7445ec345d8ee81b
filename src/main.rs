use std::sync::Arc;
use tracing::{info, warn};

mod agent_gateway;
mod allocator;
mod auth;
mod config;
mod console_relay;
mod errors;
mod http_api;
mod lifecycle;
mod models;
mod rate_limit;
mod store;
mod version_cache;

pub use agent_gateway::{AgentApi, HttpAgentClient};
pub use auth::AuthService;
pub use config::PanelConfig;
pub use errors::{PanelError, PanelResult};
pub use lifecycle::LifecycleManager;
pub use rate_limit::RateLimiter;
pub use store::DataStore;
pub use version_cache::VersionCache;

const RECONCILE_INTERVAL_SECS: u64 = 300;

/// Catalyst Panel - shared application state
#[derive(Clone)]
pub struct PanelState {
    pub config: Arc<PanelConfig>,
    pub store: Arc<DataStore>,
    pub auth: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub agent: Arc<dyn AgentApi>,
    pub lifecycle: Arc<LifecycleManager>,
    pub versions: Arc<VersionCache>,
}

impl PanelState {
    pub async fn from_config(config: PanelConfig) -> PanelResult<Self> {
        info!("Initializing Catalyst Panel");

        let nodes = config
            .nodes
            .iter()
            .cloned()
            .map(|n| n.into_node())
            .collect();
        let plans = config
            .plans
            .iter()
            .cloned()
            .map(|p| p.into_plan())
            .collect();
        let store = Arc::new(DataStore::open(&config.server.data_dir, nodes, plans).await?);

        let auth = Arc::new(AuthService::new(
            config.server.secret.clone(),
            config.server.admin_token.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(&config.limits));
        let agent: Arc<dyn AgentApi> = Arc::new(HttpAgentClient::new());
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            agent.clone(),
            &config.limits,
        ));
        let versions = Arc::new(VersionCache::new());

        Ok(Self {
            config: Arc::new(config),
            store,
            auth,
            rate_limiter,
            agent,
            lifecycle,
            versions,
        })
    }

    pub async fn run(self) -> PanelResult<()> {
        info!("Starting Catalyst Panel");

        // Warm the version manifest so the first create does not pay the
        // fetch latency.
        let versions = self.versions.clone();
        tokio::spawn(async move {
            let known = versions.versions().await.len();
            if known == 0 {
                warn!("Version manifest unavailable at startup, validation fails open");
            } else {
                info!("Version manifest primed ({} versions)", known);
            }
        });

        // Periodic ledger reconciliation catches any drift the atomic
        // paths cannot see (snapshot hand-edits, interrupted shutdowns).
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                RECONCILE_INTERVAL_SECS,
            ));
            interval.tick().await;
            loop {
                interval.tick().await;
                let corrected = store.reconcile_capacity().await;
                if corrected > 0 {
                    warn!("Periodic reconciliation adjusted {} nodes", corrected);
                }
            }
        });

        let bind_addr = self.config.server.bind_addr.clone();
        let app = http_api::router(self);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!("Panel API listening on {}", bind_addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| PanelError::Persistence(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    let mut config_path: Option<String> = None;
    let mut issue_token_for: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next(),
            "--issue-token" => issue_token_for = args.next(),
            _ => {}
        }
    }

    let config_path = config_path.as_deref().unwrap_or("./config.toml");
    // Load config first so logging level/format can be applied.
    let config = PanelConfig::from_file(config_path)
        .or_else(|_| PanelConfig::from_file("/opt/catalyst-panel/config.toml"))
        .or_else(|_| PanelConfig::from_env())
        .map_err(anyhow::Error::msg)
        .context("no usable configuration")?;

    // Mint a user token the way the identity service does, then exit.
    // Operator convenience for poking the API from the command line.
    if let Some(user_id) = issue_token_for {
        let auth = AuthService::new(
            config.server.secret.clone(),
            config.server.admin_token.clone(),
        );
        println!("{}", auth.issue_user_token(&user_id, 86_400));
        return Ok(());
    }

    let filter = format!("catalyst_panel={},tower_http=info", config.logging.level);
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Catalyst Panel starting");
    info!("Configuration loaded: {:?}", config);

    let state = PanelState::from_config(config)
        .await
        .context("failed to initialize panel state")?;
    state.run().await.context("panel exited with error")?;

    Ok(())
}
