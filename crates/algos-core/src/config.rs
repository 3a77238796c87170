use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Ledger backend: SQLite file under the XDG state dir, or process-local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Sqlite,
    Memory,
}

/// REST server settings (optional `[server]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,
    /// Close out jobs left pending/running by a previous process on startup.
    #[serde(default = "default_true")]
    pub recover_on_start: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            recover_on_start: true,
        }
    }
}

/// Global configuration loaded from `~/.config/algos/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgosConfig {
    /// Number of execution slots (jobs running at once).
    pub slots: usize,
    /// Maximum number of pending jobs; submissions beyond this fail with CapacityExceeded.
    pub max_queue_depth: usize,
    /// Per-job execution timeout in seconds.
    pub job_timeout_secs: u64,
    /// How long an idempotency key stays bound to its job (None = forever).
    #[serde(default)]
    pub idempotency_window_secs: Option<u64>,
    /// How long finished jobs are retained (None = forever).
    #[serde(default)]
    pub retention_secs: Option<u64>,
    /// Interval for cross-process waits and the retention sweep.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Ledger backend: "sqlite" (default) or "memory".
    #[serde(default)]
    pub ledger: LedgerBackend,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for AlgosConfig {
    fn default() -> Self {
        Self {
            slots: 4,
            max_queue_depth: 256,
            job_timeout_secs: 300,
            idempotency_window_secs: None,
            retention_secs: None,
            poll_interval_ms: default_poll_interval_ms(),
            ledger: LedgerBackend::Sqlite,
            server: ServerConfig::default(),
        }
    }
}

impl AlgosConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs.max(1))
    }

    pub fn idempotency_window(&self) -> Option<Duration> {
        self.idempotency_window_secs.map(Duration::from_secs)
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("algos")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AlgosConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AlgosConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: AlgosConfig = toml::from_str(&data)?;
    Ok(cfg)
}
