//! Child Process Launcher
//!
//! Runs the managed application as a child process. Each launch spawns the
//! program with the startup arguments; teardown kills and reaps the child.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use crate::core::error::LaunchError;
use crate::restart::{ApplicationFactory, LaunchContext, ManagedResources};

/// Environment variable carrying the restart attempt id (0 for the first launch)
pub const ATTEMPT_ENV: &str = "HOT_RESTART_ATTEMPT";

/// Launches the application as a child process
#[derive(Debug, Clone)]
pub struct ProcessApplicationFactory {
    program: PathBuf,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl ProcessApplicationFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
            envs: Vec::new(),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, ctx: &LaunchContext<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(ctx.args)
            .env(ATTEMPT_ENV, ctx.attempt_id.unwrap_or(0).to_string());
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl ApplicationFactory for ProcessApplicationFactory {
    fn launch(&self, ctx: &LaunchContext<'_>) -> Result<ManagedResources, LaunchError> {
        tracing::info!(
            program = ?self.program,
            attempt_id = ?ctx.attempt_id,
            "Starting child process"
        );

        let child = self.command(ctx).spawn().map_err(|e| LaunchError::Spawn {
            reason: format!("{}: {}", self.program.display(), e),
        })?;
        let pid = child.id();
        tracing::debug!(pid, "Child process started");

        let mut resources = ManagedResources::new();
        resources.acquire(format!("process:{}", pid), move || stop_child(child));
        Ok(resources)
    }
}

fn stop_child(mut child: Child) -> Result<(), LaunchError> {
    let pid = child.id();

    if let Some(status) = child.try_wait()? {
        tracing::info!(pid, %status, "Child process already exited");
        return Ok(());
    }

    tracing::debug!(pid, "Killing child process");
    child.kill()?;
    let status = child.wait()?;
    tracing::debug!(pid, %status, "Child process stopped");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::restart::{Attributes, InitialResources};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn launch(
        factory: &ProcessApplicationFactory,
        args: &[String],
        attempt: Option<u64>,
    ) -> Result<ManagedResources, LaunchError> {
        let resources = InitialResources::new(vec![]);
        let attributes = Attributes::new();
        let ctx = LaunchContext::new(args, &resources, attempt, &attributes);
        factory.launch(&ctx)
    }

    fn wait_for_file(path: &Path) -> Option<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if !contents.is_empty() {
                    return Some(contents);
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_launch_passes_args_and_attempt() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.txt");
        let factory = ProcessApplicationFactory::new("sh").env("GREETING", "hello");
        let args = vec![
            "-c".to_string(),
            format!("echo \"$GREETING $HOT_RESTART_ATTEMPT\" > {}", out.display()),
        ];

        let resources = launch(&factory, &args, Some(3)).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(wait_for_file(&out).unwrap().trim(), "hello 3");

        // Already exited by now or soon; either way teardown succeeds
        resources.release_all().unwrap();
    }

    #[test]
    fn test_teardown_kills_running_child() {
        let factory = ProcessApplicationFactory::new("sleep");
        let resources = launch(&factory, &["30".to_string()], None).unwrap();
        assert!(resources.names()[0].starts_with("process:"));

        let started = Instant::now();
        resources.release_all().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let factory = ProcessApplicationFactory::new("/definitely/not/a/program");
        let err = launch(&factory, &[], None).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(!err.is_teardown());
    }
}
