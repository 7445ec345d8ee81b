use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const MANIFEST_URL: &str = "https://launchermeta.mojang.com/mc/game/version_manifest.json";
const CACHE_TTL: Duration = Duration::from_secs(30 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Manifest {
    versions: Vec<ManifestVersion>,
}

#[derive(Debug, Deserialize)]
struct ManifestVersion {
    id: String,
}

#[derive(Default)]
struct CacheState {
    versions: Vec<String>,
    fetched_at: Option<Instant>,
}

/// Process-wide cache of the upstream version manifest: explicit state with
/// a last-refresh stamp and a fixed validity window. Concurrent refreshes
/// collapse into one in-flight fetch behind `refresh_lock`.
pub struct VersionCache {
    client: reqwest::Client,
    manifest_url: String,
    ttl: Duration,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::with_options(MANIFEST_URL.to_string(), CACHE_TTL)
    }

    fn with_options(manifest_url: String, ttl: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            manifest_url,
            ttl,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn versions(&self) -> Vec<String> {
        self.ensure_fresh().await;
        self.state.read().versions.clone()
    }

    /// Whether the manifest knows the given version. `None` when the
    /// manifest has never been fetched, so callers can fail open instead of
    /// blocking provisioning on upstream downtime.
    pub async fn is_known(&self, version: &str) -> Option<bool> {
        self.ensure_fresh().await;
        let state = self.state.read();
        if state.fetched_at.is_none() {
            return None;
        }
        Some(state.versions.iter().any(|v| v == version))
    }

    async fn ensure_fresh(&self) {
        if self.is_fresh() {
            return;
        }
        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited on the lock.
        if self.is_fresh() {
            return;
        }
        match self.fetch().await {
            Ok(versions) => {
                debug!("Version manifest refreshed ({} versions)", versions.len());
                let mut state = self.state.write();
                state.versions = versions;
                state.fetched_at = Some(Instant::now());
            }
            Err(e) => {
                warn!("Version manifest refresh failed: {}", e);
            }
        }
    }

    fn is_fresh(&self) -> bool {
        self.state
            .read()
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    async fn fetch(&self) -> Result<Vec<String>, String> {
        let response = self
            .client
            .get(&self.manifest_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("manifest returned {}", response.status()));
        }
        let manifest: Manifest = response.json().await.map_err(|e| e.to_string())?;
        Ok(manifest.versions.into_iter().map(|v| v.id).collect())
    }
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new()
    }
}
