//! Restart listener hooks and explicit listener discovery
//!
//! Hooks run in registration order. A hook that errors or panics is logged
//! and skipped; the remaining hooks and the restart itself carry on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::error::ListenerError;
use crate::watcher::ChangeBatch;

/// Observer notified around each restart attempt
pub trait RestartListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called before the current instance is torn down
    fn before_restart(&self, _batch: &ChangeBatch) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called once the attempt has finished
    fn after_restart(&self, _success: bool) -> Result<(), ListenerError> {
        Ok(())
    }
}

pub type SharedListener = Arc<dyn RestartListener>;

type ListenerFactory = Box<dyn Fn() -> SharedListener + Send + Sync>;

/// Explicit registry of listener extensions
///
/// Extensions register a named factory; `discover` instantiates every
/// registered listener in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    factories: Vec<(String, ListenerFactory)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener factory under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> SharedListener + Send + Sync + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
        self
    }

    /// Register an already-built listener
    pub fn register_instance(&mut self, listener: SharedListener) -> &mut Self {
        let name = listener.name().to_string();
        self.register(name, move || Arc::clone(&listener))
    }

    /// Instantiate all registered listeners
    pub fn discover(&self) -> Vec<SharedListener> {
        let listeners: Vec<_> = self.factories.iter().map(|(_, factory)| factory()).collect();
        tracing::debug!(count = listeners.len(), "Discovered restart listeners");
        listeners
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Logs every attempt at info level
#[derive(Debug, Default)]
pub struct LoggingListener;

impl RestartListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn before_restart(&self, batch: &ChangeBatch) -> Result<(), ListenerError> {
        tracing::info!(batch_id = %batch.id, entries = batch.len(), "Restarting after changes");
        for entry in batch.entries() {
            tracing::debug!(path = ?entry.path, kind = ?entry.kind, "Changed");
        }
        Ok(())
    }

    fn after_restart(&self, success: bool) -> Result<(), ListenerError> {
        if success {
            tracing::info!("Restart completed");
        } else {
            tracing::warn!("Restart failed");
        }
        Ok(())
    }
}

/// Run every `before_restart` hook; returns how many failed
pub(crate) fn notify_before(listeners: &[SharedListener], batch: &ChangeBatch) -> usize {
    let mut failures = 0;
    for listener in listeners {
        let listener: &dyn RestartListener = &**listener;
        if invoke(listener, "before_restart", || listener.before_restart(batch)).is_err() {
            failures += 1;
        }
    }
    failures
}

/// Run every `after_restart` hook; returns how many failed
pub(crate) fn notify_after(listeners: &[SharedListener], success: bool) -> usize {
    let mut failures = 0;
    for listener in listeners {
        let listener: &dyn RestartListener = &**listener;
        if invoke(listener, "after_restart", || listener.after_restart(success)).is_err() {
            failures += 1;
        }
    }
    failures
}

fn invoke<F>(listener: &dyn RestartListener, hook: &str, f: F) -> Result<(), ListenerError>
where
    F: FnOnce() -> Result<(), ListenerError>,
{
    let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ListenerError::Panicked {
            listener: listener.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    };

    if let Err(ref e) = result {
        tracing::warn!(listener = listener.name(), hook, "Restart listener failed: {}", e);
    }
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
