//! hot-restart core module
//!
//! Configuration and error types shared by the watcher, the engine and the controller.

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::RestartConfig;
pub use error::{LaunchError, ListenerError, RestartError, Result};
