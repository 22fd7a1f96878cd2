//! hot-restart - restart a command whenever its sources change
//!
//! Usage:
//!   hot-restart [--watch DIR]... [--exclude GLOB]... -- <command> [args...]
//!
//! The binary acts as the host application: it reports Started and Ready
//! to the restart controller, runs the command as a child process and
//! restarts it on change until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use hot_restart::controller::{LifecycleDispatcher, LifecycleEvent, RestartController};
use hot_restart::core::config::RestartConfig;
use hot_restart::logging::{LogFormat, LogLevel, LoggingConfig, LoggingSystem};
use hot_restart::process::ProcessApplicationFactory;
use hot_restart::restart::{
    ApplicationFactory, Attributes, DefaultRestartInitializer, InitialResources, LaunchContext,
    ListenerRegistry, LoggingListener, RestartContext, RestartEngine, SharedListener,
};
use hot_restart::watcher::{FileChangeSource, FileChangeSourceConfig};

/// How long to wait for the first launch before reporting the boot result
const BOOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "hot-restart", version)]
#[command(about = "Restart a command whenever its sources change")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory to watch (repeatable, replaces the configured roots)
    #[arg(short, long = "watch", value_name = "DIR")]
    watch: Vec<PathBuf>,

    /// Extra exclusion glob (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Only restart once this file changes
    #[arg(long, value_name = "NAME")]
    trigger_file: Option<String>,

    /// Poll the file system instead of using native notifications
    #[arg(long)]
    poll: bool,

    /// Quiet period before a batch of changes is emitted
    #[arg(long, value_name = "MS")]
    quiet_period: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    /// Command to run, followed by its arguments
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        let mut config = if self.verbose {
            LoggingConfig::development()
        } else {
            LoggingConfig::default()
        };
        if self.json_logs {
            config = config.with_format(LogFormat::Json);
        }
        config.with_module_level("notify", LogLevel::Warn)
    }

    fn restart_config(&self) -> Result<RestartConfig> {
        let mut config = RestartConfig::load_or_default(self.config.as_deref())
            .context("Failed to load configuration")?;

        if !self.watch.is_empty() {
            config.watch_paths = self.watch.clone();
        }
        config.additional_exclude.extend(self.exclude.iter().cloned());
        if let Some(trigger) = &self.trigger_file {
            config.trigger_file = Some(trigger.clone());
        }
        if self.poll {
            config.use_polling = true;
        }
        if let Some(ms) = self.quiet_period {
            config.quiet_period_ms = ms;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep alive for the whole run so the file writer is flushed on exit
    let _logging_system = match LoggingSystem::init(cli.logging_config()) {
        Ok(system) => {
            if let Some(dir) = system.log_directory() {
                tracing::debug!(dir = ?dir, "Writing log files");
            }
            Some(system)
        }
        Err(e) => {
            eprintln!("Failed to initialize logging system: {}. Using basic logging.", e);
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                )
                .init();
            None
        }
    };

    let config = cli.restart_config()?;
    let (program, args) = cli
        .command
        .split_first()
        .context("No command given")?;
    let args = args.to_vec();

    tracing::info!(
        program = %program,
        roots = ?config.all_roots(),
        quiet_period_ms = config.quiet_period_ms,
        "Starting hot-restart"
    );

    let factory = Arc::new(ProcessApplicationFactory::new(program));
    let source = FileChangeSource::new(FileChangeSourceConfig::from(&config));
    let engine = RestartEngine::new(factory.clone(), Box::new(source));
    let context = Arc::new(RestartContext::new(engine.clone()));

    let mut registry = ListenerRegistry::new();
    registry.register("logging", || Arc::new(LoggingListener) as SharedListener);

    let initializer = DefaultRestartInitializer::from_config(&config)
        .context("Invalid exclusion patterns")?;
    let controller = RestartController::new(context, Arc::new(initializer)).with_registry(registry);

    let mut dispatcher = LifecycleDispatcher::new();
    dispatcher.register(Arc::new(controller));

    dispatcher.dispatch(&LifecycleEvent::Started { args: args.clone() });

    // Restart disabled or declined: run the command once, unmanaged
    let mut unmanaged = None;
    if engine.is_dormant() || engine.state().is_terminal() {
        tracing::info!("Running without restart support");
        let resources = InitialResources::new(vec![]);
        let attributes = Attributes::new();
        let ctx = LaunchContext::new(&args, &resources, None, &attributes);
        unmanaged = Some(factory.launch(&ctx)?);
    } else if !engine.wait_until_idle(BOOT_TIMEOUT) {
        tracing::warn!("First launch still running after {:?}", BOOT_TIMEOUT);
    }

    match engine.last_failure() {
        Some(reason) if unmanaged.is_none() => {
            dispatcher.dispatch(&LifecycleEvent::Failed { reason })
        }
        _ => dispatcher.dispatch(&LifecycleEvent::Ready),
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    tokio::task::spawn_blocking(move || {
        engine.shutdown();
        if let Some(instance) = unmanaged {
            if let Err(e) = instance.release_all() {
                tracing::warn!("Failed to stop command: {}", e);
            }
        }
    })
    .await
    .context("Shutdown task failed")?;

    Ok(())
}
