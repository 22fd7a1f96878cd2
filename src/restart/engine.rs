//! Restart Engine
//!
//! Owns the restart lifecycle. Change batches from the change source are
//! queued under a single lock and executed one at a time on a dedicated
//! `restart-worker` thread; batches arriving mid-restart are merged into the
//! next attempt.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Condvar, Mutex};

use super::application::{ApplicationFactory, Attributes, LaunchContext, ManagedResources};
use super::attempt::{AttemptLog, AttemptOutcome, RestartAttempt};
use super::initializer::{InitialResources, RestartInitializer};
use super::listener::{notify_after, notify_before, SharedListener};
use super::state::RestartState;
use crate::core::error::{LaunchError, RestartError, Result};
use crate::watcher::{BatchSink, ChangeBatch, ChangeSource};

/// Most recent states kept by `state_history`
pub(crate) const HISTORY_LIMIT: usize = 64;

/// Mutable engine state, guarded by `Shared::inner`
struct Inner {
    state: RestartState,
    history: VecDeque<RestartState>,
    dormant: bool,
    args: Vec<String>,
    resources: Option<InitialResources>,
    listeners: Vec<SharedListener>,
    pending: Option<ChangeBatch>,
    initial_launch: bool,
    running: bool,
    instance: Option<ManagedResources>,
    attempts: AttemptLog,
    last_failure: Option<String>,
    shutdown: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: RestartState::Uninitialized,
            history: VecDeque::from([RestartState::Uninitialized]),
            dormant: false,
            args: Vec::new(),
            resources: None,
            listeners: Vec::new(),
            pending: None,
            initial_launch: false,
            running: false,
            instance: None,
            attempts: AttemptLog::new(),
            last_failure: None,
            shutdown: false,
        }
    }

    fn transition(&mut self, next: RestartState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::trace!(from = %self.state, to = %next, "Ignoring illegal transition");
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "Restart state changed");
        self.state = next;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(next);
        true
    }

    fn is_busy(&self) -> bool {
        self.initial_launch
            || self.running
            || matches!(
                self.state,
                RestartState::RestartPending | RestartState::Restarting
            )
    }
}

struct Shared {
    inner: Mutex<Inner>,
    /// Wakes the worker when there is work
    wakeup: Condvar,
    /// Signalled whenever a job finishes
    idle: Condvar,
    factory: Arc<dyn ApplicationFactory>,
    source: Mutex<Box<dyn ChangeSource>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    attributes: Attributes,
}

enum Job {
    Launch,
    Restart(ChangeBatch),
}

/// The restart engine
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct RestartEngine {
    shared: Arc<Shared>,
}

impl RestartEngine {
    pub fn new(factory: Arc<dyn ApplicationFactory>, source: Box<dyn ChangeSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::new()),
                wakeup: Condvar::new(),
                idle: Condvar::new(),
                factory,
                source: Mutex::new(source),
                worker: Mutex::new(None),
                attributes: Attributes::new(),
            }),
        }
    }

    /// Initialize the engine once; later calls are no-ops
    ///
    /// The engine is dormant when `restart_on_initialize` is false or the
    /// initializer declines: it tracks state but never restarts.
    pub fn initialize(
        &self,
        args: Vec<String>,
        restart_on_initialize: bool,
        initializer: &dyn RestartInitializer,
        listeners: Vec<SharedListener>,
    ) -> Result<()> {
        let active = {
            let mut inner = self.shared.inner.lock();
            if inner.state != RestartState::Uninitialized {
                tracing::debug!(state = %inner.state, "Restart engine already initialized");
                return Ok(());
            }
            inner.transition(RestartState::Initializing);

            let resources = initializer.initial_resources(&args);
            inner.dormant = !restart_on_initialize || resources.is_none();
            inner.args = args;
            inner.resources = resources;
            inner.listeners = listeners;
            inner.initial_launch = !inner.dormant;

            tracing::info!(
                dormant = inner.dormant,
                roots = inner.resources.as_ref().map_or(0, |r| r.resources().len()),
                listeners = inner.listeners.len(),
                "Restart engine initialized"
            );
            !inner.dormant
        };

        if active {
            if let Err(e) = self.spawn_worker() {
                let mut inner = self.shared.inner.lock();
                inner.dormant = true;
                inner.initial_launch = false;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Mark the first boot complete
    ///
    /// Starts monitoring when active; moves to `Finished` when dormant.
    ///
    /// If the change source fails to start the engine stays `Initializing`
    /// and `finish` may be retried.
    pub fn finish(&self) -> Result<()> {
        // Held for the whole call so a concurrent disable cannot stop the
        // source before it has been started
        let mut source = self.shared.source.lock();

        let resources = {
            let mut inner = self.shared.inner.lock();
            if inner.state != RestartState::Initializing {
                tracing::debug!(state = %inner.state, "Ignoring finish");
                return Ok(());
            }
            if inner.dormant {
                inner.transition(RestartState::Finished);
                tracing::info!("Restart engine finished without monitoring");
                return Ok(());
            }
            inner.resources.clone().unwrap_or_else(|| InitialResources::new(vec![]))
        };

        let weak = Arc::downgrade(&self.shared);
        let sink: BatchSink = Arc::new(move |batch: ChangeBatch| {
            if let Some(shared) = Weak::upgrade(&weak) {
                RestartEngine { shared }.restart(batch);
            }
        });

        if let Err(e) = source.start(resources.resources(), sink) {
            tracing::error!("Failed to start change source: {}", e);
            self.shared.inner.lock().last_failure = Some(e.to_string());
            return Err(e);
        }

        let mut inner = self.shared.inner.lock();
        if inner.transition(RestartState::Monitoring) {
            tracing::info!("Monitoring for changes");
        } else {
            // Disabled meanwhile; disable() stops the source once we return
            tracing::debug!(state = %inner.state, "Change source started after disable");
        }
        Ok(())
    }

    /// Turn restart off for good
    ///
    /// Safe from any thread. An attempt already past teardown completes;
    /// no new attempt starts after this returns.
    pub fn disable(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state == RestartState::Disabled {
                return;
            }
            inner.transition(RestartState::Disabled);
            inner.pending = None;
            inner.initial_launch = false;
            inner.shutdown = true;
            tracing::info!("Restart disabled");
        }
        self.shared.wakeup.notify_all();
        self.shared.idle.notify_all();

        self.shared.source.lock().stop();
    }

    /// Queue a change batch for restart
    ///
    /// Called by the change source; may also be used as a manual trigger.
    pub fn restart(&self, batch: ChangeBatch) {
        if batch.is_empty() {
            tracing::trace!("Ignoring empty change batch");
            return;
        }

        let mut inner = self.shared.inner.lock();
        match inner.state {
            RestartState::Monitoring => {
                tracing::debug!(batch_id = %batch.id, entries = batch.len(), "Restart requested");
                inner.pending = Some(batch);
                inner.transition(RestartState::RestartPending);
                drop(inner);
                self.shared.wakeup.notify_all();
            }
            RestartState::RestartPending | RestartState::Restarting => {
                tracing::debug!(
                    batch_id = %batch.id,
                    entries = batch.len(),
                    "Merging into pending restart"
                );
                inner
                    .pending
                    .get_or_insert_with(ChangeBatch::empty)
                    .merge(batch);
            }
            state => {
                tracing::debug!(%state, batch_id = %batch.id, "Dropping change batch");
            }
        }
    }

    /// Disable, wait for the worker and release the current instance
    pub fn shutdown(&self) {
        self.disable();

        if let Some(handle) = self.shared.worker.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        let instance = self.shared.inner.lock().instance.take();
        if let Some(instance) = instance {
            if let Err(e) = instance.release_all() {
                tracing::warn!("Failed to release application instance: {}", e);
            }
        }
    }

    /// Block until no launch or restart is queued or running
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while inner.is_busy() {
            if self.shared.idle.wait_until(&mut inner, deadline).timed_out() {
                return !inner.is_busy();
            }
        }
        true
    }

    pub fn state(&self) -> RestartState {
        self.shared.inner.lock().state
    }

    /// The most recent states the engine has been in, oldest first
    pub fn state_history(&self) -> Vec<RestartState> {
        self.shared.inner.lock().history.iter().copied().collect()
    }

    pub fn is_dormant(&self) -> bool {
        self.shared.inner.lock().dormant
    }

    pub fn attempts(&self) -> Vec<RestartAttempt> {
        self.shared.inner.lock().attempts.attempts().to_vec()
    }

    pub fn attempt_count(&self) -> usize {
        self.shared.inner.lock().attempts.len()
    }

    pub fn last_failure(&self) -> Option<String> {
        self.shared.inner.lock().last_failure.clone()
    }

    /// Whether an application instance is currently running
    pub fn has_instance(&self) -> bool {
        self.shared.inner.lock().instance.is_some()
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.source.lock().is_active()
    }

    pub fn args(&self) -> Vec<String> {
        self.shared.inner.lock().args.clone()
    }

    /// Values preserved across restarts
    pub fn attributes(&self) -> &Attributes {
        &self.shared.attributes
    }

    fn spawn_worker(&self) -> Result<()> {
        let mut worker = self.shared.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("restart-worker".to_string())
            .spawn(move || worker_loop(shared))
            .map_err(|e| RestartError::Worker(format!("Failed to spawn restart worker: {}", e)))?;
        *worker = Some(handle);
        Ok(())
    }
}

fn worker_loop(shared: Arc<Shared>) {
    tracing::debug!("Restart worker started");

    loop {
        let job = {
            let mut inner = shared.inner.lock();
            loop {
                if inner.shutdown {
                    tracing::debug!("Restart worker stopped");
                    return;
                }
                if inner.initial_launch {
                    inner.initial_launch = false;
                    inner.running = true;
                    break Job::Launch;
                }
                if inner.state == RestartState::RestartPending {
                    if let Some(batch) = inner.pending.take() {
                        inner.transition(RestartState::Restarting);
                        inner.running = true;
                        break Job::Restart(batch);
                    }
                }
                shared.wakeup.wait(&mut inner);
            }
        };

        match job {
            Job::Launch => launch_initial(&shared),
            Job::Restart(batch) => run_attempt(&shared, batch),
        }
        shared.inner.lock().running = false;
        shared.idle.notify_all();
    }
}

fn launch_initial(shared: &Shared) {
    let (args, resources) = {
        let inner = shared.inner.lock();
        (
            inner.args.clone(),
            inner.resources.clone().unwrap_or_else(|| InitialResources::new(vec![])),
        )
    };

    let ctx = LaunchContext::new(&args, &resources, None, &shared.attributes);
    let result = guarded_launch(shared.factory.as_ref(), &ctx);

    let mut inner = shared.inner.lock();
    match result {
        Ok(instance) => {
            tracing::info!(resources = instance.len(), "Application launched");
            inner.instance = Some(instance);
        }
        Err(e) => {
            tracing::error!("Initial launch failed: {}", e);
            inner.last_failure = Some(e.to_string());
        }
    }
}

fn run_attempt(shared: &Shared, batch: ChangeBatch) {
    let (id, listeners, args, resources) = {
        let mut inner = shared.inner.lock();
        (
            inner.attempts.next_id(),
            inner.listeners.clone(),
            inner.args.clone(),
            inner.resources.clone().unwrap_or_else(|| InitialResources::new(vec![])),
        )
    };

    let started_at = Utc::now();
    tracing::info!(
        attempt_id = id,
        batch_id = %batch.id,
        entries = batch.len(),
        "Restart attempt started"
    );

    notify_before(&listeners, &batch);

    // Teardown is the point of no return
    let (aborted, instance) = {
        let mut inner = shared.inner.lock();
        if inner.state == RestartState::Disabled {
            (true, None)
        } else {
            (false, inner.instance.take())
        }
    };

    let outcome = if aborted {
        tracing::info!(attempt_id = id, "Restart attempt aborted before teardown");
        AttemptOutcome::Aborted
    } else {
        match teardown_and_launch(shared, instance, &args, &resources, id) {
            Ok(new_instance) => {
                shared.inner.lock().instance = Some(new_instance);
                AttemptOutcome::Success
            }
            Err(e) => {
                tracing::error!(attempt_id = id, "Restart attempt failed: {}", e);
                AttemptOutcome::Failed(e.to_string())
            }
        }
    };

    notify_after(&listeners, outcome.is_success());

    let ended_at = Utc::now();
    let mut inner = shared.inner.lock();
    match &outcome {
        AttemptOutcome::Failed(reason) => inner.last_failure = Some(reason.clone()),
        AttemptOutcome::Success => inner.last_failure = None,
        AttemptOutcome::Aborted => {}
    }
    let attempt = RestartAttempt {
        id,
        batch,
        started_at,
        ended_at,
        outcome,
    };
    tracing::info!(
        attempt_id = id,
        duration_ms = attempt.duration_ms(),
        outcome = ?attempt.outcome,
        "Restart attempt finished"
    );
    inner.attempts.record(attempt);

    if inner.state == RestartState::Restarting {
        let next = if inner.pending.is_some() {
            RestartState::RestartPending
        } else {
            RestartState::Monitoring
        };
        inner.transition(next);
    }
}

fn teardown_and_launch(
    shared: &Shared,
    instance: Option<ManagedResources>,
    args: &[String],
    resources: &InitialResources,
    attempt_id: u64,
) -> std::result::Result<ManagedResources, LaunchError> {
    if let Some(instance) = instance {
        instance.release_all()?;
    }
    let ctx = LaunchContext::new(args, resources, Some(attempt_id), &shared.attributes);
    guarded_launch(shared.factory.as_ref(), &ctx)
}

fn guarded_launch(
    factory: &dyn ApplicationFactory,
    ctx: &LaunchContext<'_>,
) -> std::result::Result<ManagedResources, LaunchError> {
    panic::catch_unwind(AssertUnwindSafe(|| factory.launch(ctx))).unwrap_or_else(|_| {
        Err(LaunchError::Spawn {
            reason: "application factory panicked".to_string(),
        })
    })
}

/// Process-wide handle to the one restart engine
///
/// Created once at startup and passed explicitly to whoever needs it.
pub struct RestartContext {
    engine: RestartEngine,
}

impl RestartContext {
    pub fn new(engine: RestartEngine) -> Self {
        Self { engine }
    }

    /// See [`RestartEngine::initialize`]
    pub fn initialize(
        &self,
        args: Vec<String>,
        restart_on_initialize: bool,
        initializer: &dyn RestartInitializer,
        listeners: Vec<SharedListener>,
    ) -> Result<()> {
        self.engine
            .initialize(args, restart_on_initialize, initializer, listeners)
    }

    /// See [`RestartEngine::disable`]
    pub fn disable(&self) {
        self.engine.disable();
    }

    /// The engine, once `initialize` or `disable` has been called
    pub fn instance(&self) -> Result<&RestartEngine> {
        if self.engine.state() == RestartState::Uninitialized {
            return Err(RestartError::NotInitialized);
        }
        Ok(&self.engine)
    }
}
