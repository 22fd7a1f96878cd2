//! Lifecycle Controller
//!
//! Adapts host lifecycle events into restart engine calls. The controller
//! never blocks: `Started` reads the enable flag and initializes the
//! engine; `Ready` and `Failed` mark the first boot complete.

mod flag;

pub use flag::{
    EnabledFlag, EnvEnabledFlag, NoReloadAgent, ReloadAgentProbe, SharedReloadAgent, StaticFlag,
    ENABLED_ENV,
};

use std::sync::Arc;

use crate::restart::{ListenerRegistry, RestartContext, RestartInitializer};

/// Runs before every other lifecycle listener
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;
/// Runs after every other lifecycle listener
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Host lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application is starting with these arguments
    Started { args: Vec<String> },
    /// The application finished booting
    Ready,
    /// The application failed to boot
    Failed { reason: String },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Started { .. } => "started",
            LifecycleEvent::Ready => "ready",
            LifecycleEvent::Failed { .. } => "failed",
        }
    }
}

/// Receives host lifecycle events
pub trait LifecycleListener: Send + Sync {
    /// Lower values run first
    fn order(&self) -> i32 {
        0
    }

    fn on_event(&self, event: &LifecycleEvent);
}

/// Delivers lifecycle events to listeners in ascending order
#[derive(Default)]
pub struct LifecycleDispatcher {
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; equal orders keep registration order
    pub fn register(&mut self, listener: Arc<dyn LifecycleListener>) -> &mut Self {
        self.listeners.push(listener);
        self.listeners.sort_by_key(|l| l.order());
        self
    }

    pub fn dispatch(&self, event: &LifecycleEvent) {
        tracing::debug!(
            event = event.name(),
            listeners = self.listeners.len(),
            "Dispatching lifecycle event"
        );
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Lifecycle listener driving the restart engine
pub struct RestartController {
    context: Arc<RestartContext>,
    initializer: Arc<dyn RestartInitializer>,
    registry: ListenerRegistry,
    agent: Arc<dyn ReloadAgentProbe>,
    flag: Box<dyn EnabledFlag>,
    order: i32,
}

impl RestartController {
    pub fn new(context: Arc<RestartContext>, initializer: Arc<dyn RestartInitializer>) -> Self {
        Self {
            context,
            initializer,
            registry: ListenerRegistry::new(),
            agent: Arc::new(NoReloadAgent),
            flag: Box::new(EnvEnabledFlag::default()),
            order: HIGHEST_PRECEDENCE,
        }
    }

    pub fn with_registry(mut self, registry: ListenerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn ReloadAgentProbe>) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_flag(mut self, flag: impl EnabledFlag + 'static) -> Self {
        self.flag = Box::new(flag);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn context(&self) -> &Arc<RestartContext> {
        &self.context
    }

    fn on_started(&self, args: &[String]) {
        if !self.flag.is_enabled() {
            tracing::info!("Restart disabled by {}", ENABLED_ENV);
            self.context.disable();
            return;
        }

        let listeners = self.registry.discover();
        let restart_on_initialize = !self.agent.is_active();
        if !restart_on_initialize {
            tracing::info!("Reload agent active, restart on initialize skipped");
        }

        if let Err(e) = self.context.initialize(
            args.to_vec(),
            restart_on_initialize,
            self.initializer.as_ref(),
            listeners,
        ) {
            tracing::error!("Failed to initialize restart engine: {}", e);
        }
    }

    fn on_boot_complete(&self) {
        match self.context.instance() {
            Ok(engine) => {
                if let Err(e) = engine.finish() {
                    tracing::error!("Failed to start monitoring: {}", e);
                }
            }
            Err(e) => tracing::error!("Boot completed before restart setup: {}", e),
        }
    }
}

impl LifecycleListener for RestartController {
    fn order(&self) -> i32 {
        self.order
    }

    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Started { args } => self.on_started(args),
            LifecycleEvent::Ready => self.on_boot_complete(),
            LifecycleEvent::Failed { reason } => {
                tracing::warn!(reason = %reason, "Application failed to boot");
                self.on_boot_complete();
            }
        }
    }
}
