//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Overrides the data directory
pub const HOME_ENV: &str = "STRATAGEM_HOME";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Markdown template store
    pub templates_path: PathBuf,

    /// Saved profiles and the last-profile pointer
    pub saves_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var_os("HOME").context("neither STRATAGEM_HOME nor HOME is set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("stratagem-daemon")
            }
        };
        Ok(Self::with_data_dir(data_dir))
    }

    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            socket_path: data_dir.join("daemon.sock"),
            templates_path: data_dir.join("stratagems.md"),
            saves_dir: data_dir.join("saves"),
            data_dir,
        }
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.saves_dir)
            .with_context(|| format!("failed to create {}", self.saves_dir.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_data_dir() {
        let config = Config::with_data_dir("/tmp/strat");
        assert_eq!(config.socket_path, PathBuf::from("/tmp/strat/daemon.sock"));
        assert_eq!(config.templates_path, PathBuf::from("/tmp/strat/stratagems.md"));
        assert_eq!(config.saves_dir, PathBuf::from("/tmp/strat/saves"));
    }

    #[test]
    fn test_ensure_dirs_creates_saves() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path().join("data"));
        config.ensure_dirs().unwrap();
        assert!(config.saves_dir.is_dir());
    }
}
