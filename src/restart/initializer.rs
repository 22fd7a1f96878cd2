//! Restart initializer
//!
//! Computes the resource roots that a restart engine watches, and the
//! exclusion rules that decide which changes matter.

use std::path::{Path, PathBuf};

use crate::core::config::RestartConfig;
use crate::core::error::Result;
use crate::watcher::{ResourceFilter, WatchedResource};

/// Argument that opts a single launch out of restart support
pub const NO_RESTART_ARG: &str = "--no-restart";

/// Roots and filters computed at initialization
#[derive(Debug, Clone)]
pub struct InitialResources {
    resources: Vec<WatchedResource>,
}

impl InitialResources {
    pub fn new(resources: Vec<WatchedResource>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &[WatchedResource] {
        &self.resources
    }

    pub fn roots(&self) -> Vec<&Path> {
        self.resources.iter().map(|r| r.root()).collect()
    }

    /// Whether a change to `path` should be ignored
    pub fn is_excluded(&self, path: &Path) -> bool {
        !self.resources.iter().any(|r| r.accepts(path))
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Strategy computing the initial watched resources
pub trait RestartInitializer: Send + Sync {
    /// Resources to watch, or `None` if restart should not be used for
    /// this launch
    fn initial_resources(&self, args: &[String]) -> Option<InitialResources>;
}

/// Initializer used by the lifecycle controller
///
/// Declines when not called on the `main` thread (test harnesses and
/// worker threads) or when the launch opted out with `--no-restart`.
/// System library locations are never watched.
#[derive(Debug, Clone)]
pub struct DefaultRestartInitializer {
    roots: Vec<PathBuf>,
    filter: ResourceFilter,
    main_thread_only: bool,
    system_prefixes: Vec<PathBuf>,
}

impl DefaultRestartInitializer {
    pub fn new(roots: Vec<PathBuf>, filter: ResourceFilter) -> Self {
        Self {
            roots,
            filter,
            main_thread_only: true,
            system_prefixes: default_system_prefixes(),
        }
    }

    /// Build from configuration: all roots, configured exclusions
    pub fn from_config(config: &RestartConfig) -> Result<Self> {
        let filter = ResourceFilter::new(
            config.exclusion_patterns().cloned().collect(),
            config.include.clone(),
        )?;
        Ok(Self::new(config.all_roots(), filter))
    }

    /// Skip the main-thread check
    pub fn allow_any_thread(mut self) -> Self {
        self.main_thread_only = false;
        self
    }

    /// Replace the list of non-reloadable locations
    pub fn with_system_prefixes(mut self, prefixes: Vec<PathBuf>) -> Self {
        self.system_prefixes = prefixes;
        self
    }

    fn is_system_location(&self, path: &Path) -> bool {
        self.system_prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

impl RestartInitializer for DefaultRestartInitializer {
    fn initial_resources(&self, args: &[String]) -> Option<InitialResources> {
        if self.main_thread_only && std::thread::current().name() != Some("main") {
            tracing::debug!("Not on the main thread, restart support skipped");
            return None;
        }

        if args.iter().any(|a| a == NO_RESTART_ARG) {
            tracing::debug!("Restart support skipped by {}", NO_RESTART_ARG);
            return None;
        }

        let resources = self
            .roots
            .iter()
            .map(|root| absolutize(root))
            .filter(|root| {
                let system = self.is_system_location(root);
                if system {
                    tracing::debug!(root = ?root, "Skipping non-reloadable root");
                }
                !system
            })
            .map(|root| WatchedResource::new(root, self.filter.clone()))
            .collect();

        Some(InitialResources::new(resources))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn default_system_prefixes() -> Vec<PathBuf> {
    let mut prefixes = vec![PathBuf::from("/usr/lib"), PathBuf::from("/usr/local/lib")];

    let cargo_home = std::env::var_os("CARGO_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".cargo")));
    if let Some(cargo_home) = cargo_home {
        prefixes.push(cargo_home.join("registry"));
        prefixes.push(cargo_home.join("git"));
    }

    let rustup_home = std::env::var_os("RUSTUP_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".rustup")));
    if let Some(rustup_home) = rustup_home {
        prefixes.push(rustup_home.join("toolchains"));
    }

    prefixes
}
