//! Managed application instances
//!
//! An application instance is represented by the stack of resources it
//! acquired. Teardown releases them in reverse acquisition order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::initializer::InitialResources;
use crate::core::error::LaunchError;

type Release = Box<dyn FnOnce() -> Result<(), LaunchError> + Send>;

/// Resources held by one application instance
#[derive(Default)]
pub struct ManagedResources {
    stack: Vec<(String, Release)>,
}

impl ManagedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acquired resource and how to release it
    pub fn acquire<F>(&mut self, name: impl Into<String>, release: F) -> &mut Self
    where
        F: FnOnce() -> Result<(), LaunchError> + Send + 'static,
    {
        self.stack.push((name.into(), Box::new(release)));
        self
    }

    /// Names in acquisition order
    pub fn names(&self) -> Vec<&str> {
        self.stack.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Release everything, newest first
    ///
    /// Every resource is released even if an earlier one fails; the first
    /// failure is returned.
    pub fn release_all(mut self) -> Result<(), LaunchError> {
        self.release_stack()
    }

    fn release_stack(&mut self) -> Result<(), LaunchError> {
        let mut first_error = None;

        while let Some((name, release)) = self.stack.pop() {
            tracing::debug!(resource = %name, "Releasing resource");
            if let Err(e) = release() {
                tracing::warn!(resource = %name, "Failed to release resource: {}", e);
                first_error.get_or_insert(LaunchError::Teardown {
                    resource: name,
                    reason: e.to_string(),
                });
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ManagedResources {
    fn drop(&mut self) {
        let _ = self.release_stack();
    }
}

impl std::fmt::Debug for ManagedResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedResources")
            .field("resources", &self.names())
            .finish()
    }
}

/// Values that survive restarts
///
/// Clones share the same store.
#[derive(Clone, Default)]
pub struct Attributes {
    values: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored value for `name`, creating it with `init` if absent.
    /// Returns `None` if the stored value has a different type.
    pub fn get_or_insert_with<T, F>(&self, name: &str, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut values = self.values.lock();
        let value = values
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>);
        Arc::clone(value).downcast::<T>().ok()
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let values = self.values.lock();
        values
            .get(name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    pub fn remove(&self, name: &str) -> bool {
        self.values.lock().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

/// Everything needed to launch an instance
pub struct LaunchContext<'a> {
    /// Original startup arguments
    pub args: &'a [String],
    /// Current resource set
    pub resources: &'a InitialResources,
    /// Attempt id, `None` for the first launch
    pub attempt_id: Option<u64>,
    attributes: &'a Attributes,
}

impl<'a> LaunchContext<'a> {
    pub fn new(
        args: &'a [String],
        resources: &'a InitialResources,
        attempt_id: Option<u64>,
        attributes: &'a Attributes,
    ) -> Self {
        Self {
            args,
            resources,
            attempt_id,
            attributes,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        self.attributes
    }

    pub fn is_restart(&self) -> bool {
        self.attempt_id.is_some()
    }
}

/// Builds application instances
pub trait ApplicationFactory: Send + Sync {
    fn launch(&self, ctx: &LaunchContext<'_>) -> Result<ManagedResources, LaunchError>;
}

/// Factory for hosts that manage their own instance; launches nothing
#[derive(Debug, Default)]
pub struct NoopApplicationFactory;

impl ApplicationFactory for NoopApplicationFactory {
    fn launch(&self, _ctx: &LaunchContext<'_>) -> Result<ManagedResources, LaunchError> {
        Ok(ManagedResources::new())
    }
}
