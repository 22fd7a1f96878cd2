//! Process-level switches read by the controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Environment variable that turns restart support off when set to `false`
pub const ENABLED_ENV: &str = "HOT_RESTART_ENABLED";

/// Source of the raw enable/disable override
pub trait EnabledFlag: Send + Sync {
    /// Raw flag value, if set
    fn read(&self) -> Option<String>;

    /// Whether restart support is enabled
    ///
    /// Only `false` (any case, surrounding whitespace ignored) disables;
    /// an absent or unparsable value leaves restart enabled.
    fn is_enabled(&self) -> bool {
        match self.read() {
            Some(raw) => parse_enabled(&raw),
            None => true,
        }
    }
}

fn parse_enabled(raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "false" => false,
        "true" => true,
        other => {
            tracing::warn!(value = other, "Unrecognized {} value, assuming enabled", ENABLED_ENV);
            true
        }
    }
}

/// Reads the flag from an environment variable
#[derive(Debug, Clone)]
pub struct EnvEnabledFlag {
    var: String,
}

impl EnvEnabledFlag {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvEnabledFlag {
    fn default() -> Self {
        Self::new(ENABLED_ENV)
    }
}

impl EnabledFlag for EnvEnabledFlag {
    fn read(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

/// Fixed flag value
#[derive(Debug, Clone, Default)]
pub struct StaticFlag(pub Option<String>);

impl StaticFlag {
    pub fn unset() -> Self {
        Self(None)
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }
}

impl EnabledFlag for StaticFlag {
    fn read(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Detects an in-process code reloader
///
/// When one is active, boot-time restarts are skipped and the engine
/// stays dormant.
pub trait ReloadAgentProbe: Send + Sync {
    fn is_active(&self) -> bool;
}

/// No reload agent is ever present
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReloadAgent;

impl ReloadAgentProbe for NoReloadAgent {
    fn is_active(&self) -> bool {
        false
    }
}

/// Agent presence toggled by the reloader itself
#[derive(Debug, Clone, Default)]
pub struct SharedReloadAgent {
    active: Arc<AtomicBool>,
}

impl SharedReloadAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl ReloadAgentProbe for SharedReloadAgent {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
