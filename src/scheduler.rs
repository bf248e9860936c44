//! Recurring background jobs
//!
//! One tokio task wakes every tick and runs the jobs that are due. Jobs run
//! one after another while holding the job registry lock and then the state
//! lock, so a sweep never observes a half-applied command and the job list
//! cannot change under it.

use crate::{
    ERROR_TARGET, SCHEDULER_TARGET,
    data::{State, StateStore},
    error::{BotError, BotResult},
};
use async_trait::async_trait;
use derive_more::{Display, From};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, Receiver, Sender},
    },
    task::JoinHandle,
    time::{Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// How often the scheduler wakes up unless configured otherwise
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Identifies a registered job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From)]
#[display("job #{_0}")]
pub struct JobId(u64);

/// Work the scheduler runs at a fixed interval
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run once with the state lock held
    async fn run(&self, store: &StateStore, state: &mut State) -> BotResult<()>;
}

/// Requests sent to the running scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerRequest {
    /// Run due jobs now instead of waiting for the next tick
    RunNow,
    Shutdown,
}

struct JobEntry {
    job: Arc<dyn ScheduledJob>,
    interval: Duration,
    last_run: Option<Instant>,
}

impl JobEntry {
    fn is_due(&self, now: Instant) -> bool {
        self.last_run.is_none_or(|last| {
            last.checked_add(self.interval)
                .is_some_and(|next| now >= next)
        })
    }
}

#[derive(Default)]
struct JobRegistry {
    entries: BTreeMap<JobId, JobEntry>,
    next_id: u64,
    defaults_registered: bool,
}

impl JobRegistry {
    fn insert(&mut self, interval: Duration, job: Arc<dyn ScheduledJob>) -> JobId {
        self.next_id += 1;
        let id = JobId(self.next_id);
        debug!(
            target: SCHEDULER_TARGET,
            job = %id,
            name = job.name(),
            interval_secs = interval.as_secs(),
            "Registered job"
        );
        self.entries.insert(
            id,
            JobEntry {
                job,
                interval,
                last_run: None,
            },
        );
        id
    }

    fn ensure_defaults(&mut self, defaults: &[(Duration, Arc<dyn ScheduledJob>)]) {
        if self.defaults_registered {
            return;
        }
        self.defaults_registered = true;
        for (interval, job) in defaults {
            self.insert(*interval, Arc::clone(job));
        }
    }
}

struct RunningLoop {
    tx: Sender<SchedulerRequest>,
    handle: JoinHandle<()>,
}

/// Owns the job registry and the background task that runs it
pub struct JobScheduler {
    store: StateStore,
    tick: Duration,
    defaults: Vec<(Duration, Arc<dyn ScheduledJob>)>,
    registry: Arc<Mutex<JobRegistry>>,
    running: Mutex<Option<RunningLoop>>,
}

impl JobScheduler {
    /// Create a scheduler that wakes every `tick`
    ///
    /// A zero tick falls back to [`DEFAULT_TICK`].
    #[must_use]
    pub fn new(store: StateStore, tick: Duration) -> Self {
        Self {
            store,
            tick: if tick.is_zero() { DEFAULT_TICK } else { tick },
            defaults: Vec::new(),
            registry: Arc::new(Mutex::new(JobRegistry::default())),
            running: Mutex::new(None),
        }
    }

    /// Add a job that is registered the first time a job is added or the
    /// scheduler starts
    #[must_use]
    pub fn with_default_job(mut self, interval: Duration, job: Arc<dyn ScheduledJob>) -> Self {
        self.defaults.push((interval, job));
        self
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Register a job
    pub async fn add(&self, interval: Duration, job: Arc<dyn ScheduledJob>) -> JobId {
        let mut registry = self.registry.lock().await;
        registry.ensure_defaults(&self.defaults);
        registry.insert(interval, job)
    }

    /// Remove a job, returning whether it was registered
    pub async fn delete(&self, id: JobId) -> bool {
        let removed = self.registry.lock().await.entries.remove(&id).is_some();
        if removed {
            debug!(target: SCHEDULER_TARGET, job = %id, "Removed job");
        }
        removed
    }

    pub async fn job_count(&self) -> usize {
        self.registry.lock().await.entries.len()
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawn the ticking task
    ///
    /// # Errors
    /// Returns [`BotError::AlreadyRunning`] if the task is already running.
    pub async fn start(&self) -> BotResult<()> {
        let mut running = self.running.lock().await;
        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return Err(BotError::AlreadyRunning);
        }

        self.registry.lock().await.ensure_defaults(&self.defaults);

        let (tx, rx) = mpsc::channel::<SchedulerRequest>(16);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.registry),
            self.store.clone(),
            self.tick,
            rx,
        ));
        *running = Some(RunningLoop { tx, handle });
        Ok(())
    }

    /// Stop the ticking task and wait for it to finish
    ///
    /// A sweep that is in progress completes first. Returns whether a task
    /// was running. The scheduler can be started again afterwards.
    pub async fn stop(&self) -> bool {
        let Some(RunningLoop { tx, handle }) = self.running.lock().await.take() else {
            return false;
        };

        if tx.send(SchedulerRequest::Shutdown).await.is_err() {
            debug!(target: SCHEDULER_TARGET, "Scheduler task already gone");
        }
        if let Err(e) = handle.await {
            error!(target: ERROR_TARGET, error = %e, "Scheduler task panicked");
        }
        true
    }

    /// Ask the running task to run due jobs now
    ///
    /// Returns false if the scheduler is not running.
    pub async fn request_run(&self) -> bool {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(running) => running.tx.send(SchedulerRequest::RunNow).await.is_ok(),
            None => false,
        }
    }

    /// Run every due job once in the calling task
    ///
    /// Returns how many jobs completed successfully.
    pub async fn run_pending(&self) -> usize {
        run_due_jobs(&self.registry, &self.store, Instant::now()).await
    }
}

async fn run_loop(
    registry: Arc<Mutex<JobRegistry>>,
    store: StateStore,
    tick: Duration,
    mut rx: Receiver<SchedulerRequest>,
) {
    info!(
        target: SCHEDULER_TARGET,
        tick_secs = tick.as_secs(),
        "Job scheduler started"
    );

    // First sweep happens one full tick after start
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            request = rx.recv() => match request {
                Some(SchedulerRequest::RunNow) => {
                    debug!(target: SCHEDULER_TARGET, "Running due jobs on request");
                    run_due_jobs(&registry, &store, Instant::now()).await;
                }
                Some(SchedulerRequest::Shutdown) | None => break,
            },
            // Runs are stamped with the scheduled tick instant, not the wake-up time
            scheduled = ticker.tick() => {
                run_due_jobs(&registry, &store, scheduled).await;
            }
        }
    }

    info!(target: SCHEDULER_TARGET, "Job scheduler stopped");
}

async fn run_due_jobs(registry: &Mutex<JobRegistry>, store: &StateStore, now: Instant) -> usize {
    let mut registry = registry.lock().await;
    let mut state = store.lock().await;
    let mut completed = 0;

    for (id, entry) in &mut registry.entries {
        if !entry.is_due(now) {
            continue;
        }

        let started = Instant::now();
        match entry.job.run(store, &mut state).await {
            Ok(()) => {
                entry.last_run = Some(now);
                completed += 1;
                debug!(
                    target: SCHEDULER_TARGET,
                    job = %id,
                    name = entry.job.name(),
                    duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or_default(),
                    "Job finished"
                );
            }
            Err(e) => warn!(
                target: ERROR_TARGET,
                job = %id,
                name = entry.job.name(),
                error = %e,
                "Job failed"
            ),
        }
    }

    completed
}
