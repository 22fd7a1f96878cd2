//! Configuration module for hot-restart
//!
//! Handles restart configuration including:
//! - Watched roots and additional paths
//! - Exclusion / inclusion patterns
//! - Debounce and polling timings
//! - Optional trigger file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{RestartError, Result};

/// Main restart configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Roots to watch for changes
    #[serde(default = "default_watch_paths")]
    pub watch_paths: Vec<PathBuf>,

    /// Extra roots watched on top of `watch_paths`
    #[serde(default)]
    pub additional_paths: Vec<PathBuf>,

    /// Patterns (relative to a root) that never trigger a restart
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Patterns appended to `exclude`
    #[serde(default)]
    pub additional_exclude: Vec<String>,

    /// Patterns that are always considered, even when excluded
    #[serde(default)]
    pub include: Vec<String>,

    /// Quiet window before a batch of changes is emitted
    #[serde(default = "default_quiet_period")]
    pub quiet_period_ms: u64,

    /// Poll interval when `use_polling` is set
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Use a polling watcher instead of native notifications
    #[serde(default)]
    pub use_polling: bool,

    /// Only restart once this file (name or relative path) changes
    #[serde(default)]
    pub trigger_file: Option<String>,
}

fn default_watch_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}

fn default_exclude() -> Vec<String> {
    vec![
        "static/**".to_string(),
        "public/**".to_string(),
        "templates/**".to_string(),
        "**/tests/**".to_string(),
        "**/*_test.rs".to_string(),
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/*.swp".to_string(),
        "**/*~".to_string(),
        "**/.DS_Store".to_string(),
    ]
}

fn default_quiet_period() -> u64 {
    400
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            watch_paths: default_watch_paths(),
            additional_paths: vec![],
            exclude: default_exclude(),
            additional_exclude: vec![],
            include: vec![],
            quiet_period_ms: default_quiet_period(),
            poll_interval_ms: default_poll_interval(),
            use_polling: false,
            trigger_file: None,
        }
    }
}

impl RestartConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RestartConfig = serde_json::from_str(&content).map_err(|e| {
            RestartError::Config(format!("Failed to parse {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check patterns and timings
    pub fn validate(&self) -> Result<()> {
        if self.quiet_period_ms == 0 {
            return Err(RestartError::Config(
                "quiet_period_ms must be greater than zero".to_string(),
            ));
        }

        for pattern in self.exclusion_patterns().chain(self.include.iter()) {
            glob::Pattern::new(pattern).map_err(|e| {
                RestartError::Config(format!("Invalid pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }

    /// All exclusion patterns, defaults first
    pub fn exclusion_patterns(&self) -> impl Iterator<Item = &String> {
        self.exclude.iter().chain(self.additional_exclude.iter())
    }

    /// All roots, configured first
    pub fn all_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.watch_paths.clone();
        for path in &self.additional_paths {
            if !roots.contains(path) {
                roots.push(path.clone());
            }
        }
        roots
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RestartConfig::default();
        assert_eq!(config.quiet_period(), Duration::from_millis(400));
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert!(!config.use_polling);
        assert!(config.trigger_file.is_none());
        assert!(config.exclude.iter().any(|p| p == "static/**"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_json_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restart.json");
        std::fs::write(
            &path,
            r#"{ "watch_paths": ["app"], "trigger_file": ".reloadtrigger" }"#,
        )
        .unwrap();

        let config = RestartConfig::load(&path).unwrap();
        assert_eq!(config.watch_paths, vec![PathBuf::from("app")]);
        assert_eq!(config.trigger_file.as_deref(), Some(".reloadtrigger"));
        assert_eq!(config.quiet_period_ms, 400);
        assert!(!config.exclude.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = RestartConfig {
            additional_exclude: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RestartError::Config(_))));
    }

    #[test]
    fn test_zero_quiet_period_rejected() {
        let config = RestartConfig {
            quiet_period_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_roots_deduplicates() {
        let config = RestartConfig {
            watch_paths: vec![PathBuf::from("src")],
            additional_paths: vec![PathBuf::from("src"), PathBuf::from("assets")],
            ..Default::default()
        };
        assert_eq!(
            config.all_roots(),
            vec![PathBuf::from("src"), PathBuf::from("assets")]
        );
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = RestartConfig::load_or_default(None).unwrap();
        assert_eq!(config.watch_paths, vec![PathBuf::from("src")]);
    }
}
