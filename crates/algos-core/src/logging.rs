//! Logging setup shared by the `algos` CLI and the `algos-rest` server.
//!
//! Each binary logs to its own file under the XDG state dir
//! (`~/.local/state/algos/<component>.log`). If that file cannot be opened the
//! binary falls back to [`init_logging_stderr`] rather than refusing to start.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Env var checked before `RUST_LOG`.
pub const LOG_ENV: &str = "ALGOS_LOG";

const DEFAULT_FILTER: &str = "info,algos=debug,algos_core=debug,algos_rest=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Path of the log file for `component` (e.g. "algos" or "algos-rest").
pub fn log_file_path(component: &str) -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("algos")?;
    Ok(xdg_dirs.get_state_home().join(format!("{component}.log")))
}

/// Install a subscriber appending to `component`'s log file. Returns the path
/// written to. Errors if the file cannot be opened or a subscriber is already set.
pub fn init_logging(component: &str) -> Result<PathBuf> {
    let path = log_file_path(component)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install subscriber: {e}"))?;

    tracing::info!(component, "logging to {}", path.display());
    Ok(path)
}

/// Stderr-only logging for when [`init_logging`] fails.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn each_component_gets_its_own_file() {
        let cli = log_file_path("algos").unwrap();
        let rest = log_file_path("algos-rest").unwrap();
        assert_eq!(cli.file_name().unwrap(), "algos.log");
        assert_eq!(rest.file_name().unwrap(), "algos-rest.log");
        assert_eq!(cli.parent(), rest.parent());
    }
}
