//! Restart Module
//!
//! Restart lifecycle: state machine, engine, listener hooks and the
//! strategy that decides which resources are watched.

mod application;
mod attempt;
mod engine;
mod initializer;
mod listener;
mod state;

pub use application::{
    ApplicationFactory, Attributes, LaunchContext, ManagedResources, NoopApplicationFactory,
};
pub use attempt::{AttemptLog, AttemptOutcome, RestartAttempt};
pub use engine::{RestartContext, RestartEngine};
pub use initializer::{
    DefaultRestartInitializer, InitialResources, RestartInitializer, NO_RESTART_ARG,
};
pub use listener::{ListenerRegistry, LoggingListener, RestartListener, SharedListener};
pub use state::RestartState;
