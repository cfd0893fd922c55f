use crate::error::{Result, StewardError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// BranchConfig
// ---------------------------------------------------------------------------

/// Names of the three long-lived pipeline branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    #[serde(default = "default_integration")]
    pub integration: String,
    #[serde(default = "default_staging")]
    pub staging: String,
    #[serde(default = "default_release")]
    pub release: String,
}

fn default_integration() -> String {
    "dev".to_string()
}

fn default_staging() -> String {
    "test".to_string()
}

fn default_release() -> String {
    "main".to_string()
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            integration: default_integration(),
            staging: default_staging(),
            release: default_release(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorktreeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeConfig {
    /// Repo-relative paths symlinked into each new worktree, for untracked
    /// state like .env files or local build caches.
    #[serde(default)]
    pub symlink_paths: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: String,
    #[serde(default)]
    pub branches: BranchConfig,
    #[serde(default)]
    pub worktree: WorktreeConfig,
    /// How fresh the newest work log must be for `spec complete`, in minutes.
    #[serde(default = "default_log_recency")]
    pub log_recency_minutes: u64,
}

fn default_version() -> u32 {
    1
}

fn default_log_recency() -> u64 {
    3
}

impl Config {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            project: project.into(),
            branches: BranchConfig::default(),
            worktree: WorktreeConfig::default(),
            log_recency_minutes: default_log_recency(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(StewardError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = serde_yaml::from_str("project: demo\n").unwrap();
        assert_eq!(cfg.branches.integration, "dev");
        assert_eq!(cfg.branches.release, "main");
        assert_eq!(cfg.log_recency_minutes, 3);
        assert!(cfg.worktree.symlink_paths.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("demo");
        cfg.worktree.symlink_paths.push(".env".to_string());
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project, "demo");
        assert_eq!(loaded.worktree.symlink_paths, vec![".env".to_string()]);
    }

    #[test]
    fn load_without_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(StewardError::NotInitialized)
        ));
    }
}
