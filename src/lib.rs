//! hot-restart - live restart coordinator for development
//!
//! This crate watches the source roots of a running application and, when
//! a debounced batch of changes arrives, restarts it in place:
//! - Change detection through notify (native or polling), with glob filters
//! - A single restart engine with a serialized, coalescing worker
//! - Listener hooks around each attempt, isolated from each other
//! - A lifecycle controller that maps Started / Ready / Failed onto the engine
//! - A child-process launcher used by the `hot-restart` binary

pub mod controller;
pub mod core;
pub mod logging;
pub mod process;
pub mod restart;
pub mod watcher;

// Re-export commonly used items
pub use controller::{LifecycleDispatcher, LifecycleEvent, LifecycleListener, RestartController};
pub use core::config::RestartConfig;
pub use core::error::{LaunchError, ListenerError, RestartError, Result};
pub use process::ProcessApplicationFactory;
pub use restart::{RestartContext, RestartEngine, RestartListener, RestartState};
pub use watcher::{ChangeBatch, ChangeEntry, ChangeKind, ChangeSource, FileChangeSource};
