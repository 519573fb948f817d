//! # Job Manager
//!
//! Owns the run-level state machine for discovery jobs: one active job
//! per requester, a global concurrency cap, a background reaper for hung
//! runs, and a bounded history of terminal jobs.
//!
//! ## Job Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          JOB LIFECYCLE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                ┌──────────┐        ┌─────────────┐                      │
//! │   start ─────► │ starting │ ─────► │ in_progress │                      │
//! │                └────┬─────┘        └──────┬──────┘                      │
//! │                     │                     │                             │
//! │                     │     ┌───────────────┼───────────────┐             │
//! │                     │     ▼               ▼               ▼             │
//! │                     │ ┌───────────┐  ┌────────┐  ┌─────────────┐        │
//! │                     └►│ cancelled │  │ failed │  │  completed  │        │
//! │                       └───────────┘  └────────┘  └─────────────┘        │
//! │                                           ▲                             │
//! │                       ┌─────────┐         │                             │
//! │          reaper ────► │ timeout │   (all terminal states are final      │
//! │                       └─────────┘    and move the job to history)       │
//! │                                                                         │
//! │  Transitions are monotonic — no backward moves — except cancellation,   │
//! │  which is allowed from any non-terminal state.                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DISCOVERY PIPELINE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  load profile ─► prepare identifiers ─► select platforms                │
//! │       │                                      │                          │
//! │       ▼                                      ▼                          │
//! │  build task set ─► chunked probe execution (executor)                   │
//! │                           │                                             │
//! │                           ▼                                             │
//! │  aggregate + breach enrichment ─► threshold filter ─► upserts           │
//! │                                                          │              │
//! │                                finalize job ◄────────────┘              │
//! │                                                                         │
//! │  Task failures never abort the run; a failed upsert is tallied and     │
//! │  the remaining upserts still happen. A `completed` job can therefore   │
//! │  be partial — callers inspect the per-platform error counters.         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The active-job registry and the history store are the only mutable
//! shared state in the engine; every access is funneled through the
//! manager's methods under its locks.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

use crate::aggregator::{
    aggregate, correlate_breaches, DiscoveredAccount, PlatformStats, SourceStats,
};
use crate::breach::{BreachProvider, BreachRecord, NullBreachProvider};
use crate::error::{Error, Result};
use crate::identifiers::{prepare_identifiers, IdentifierSource};
use crate::options::{DiscoveryOptions, JobManagerConfig};
use crate::platforms::{select_platforms, PlatformRegistry};
use crate::scheduler::{build_tasks, CancelFlag, ProbeExecutor};
use crate::storage::{AccountStore, ProfileSource};
use crate::time::{Clock, TokioClock};

/// Lifecycle state of a discovery job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, pipeline not yet running
    Starting,
    /// Pipeline is executing
    InProgress,
    /// Pipeline finished (possibly with partial coverage)
    Completed,
    /// A job-level failure occurred
    Failed,
    /// Cancellation was requested and the run drained
    Cancelled,
    /// The reaper forced the job out after its wall-clock budget
    #[serde(rename = "timeout")]
    TimedOut,
}

impl JobState {
    /// Terminal states are final; the job has left the active registry
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled | JobState::TimedOut
        )
    }

    /// Whether a transition to `next` is legal.
    ///
    /// Transitions only move forward; cancellation (and the other
    /// terminal states) can be entered from any non-terminal state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (JobState::Starting, JobState::InProgress) => true,
            (_, n) if n.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Starting => "starting",
            JobState::InProgress => "in_progress",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::TimedOut => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Coarse progress reported while a job runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    /// Pipeline step ("probing", "persisting", ...)
    pub step: String,
    /// Rough completion percentage (0-100)
    pub percentage: u8,
    /// Human-readable progress message
    pub message: String,
}

impl JobProgress {
    fn at(step: &str, percentage: u8, message: String) -> Self {
        Self {
            step: step.to_string(),
            percentage,
            message,
        }
    }
}

/// Final output of a discovery run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Discovered accounts that cleared the confidence threshold
    pub accounts: Vec<DiscoveredAccount>,
    /// Per-platform probe counters
    pub platform_stats: BTreeMap<String, PlatformStats>,
    /// Per-identifier-source probe counters
    pub source_stats: BTreeMap<IdentifierSource, SourceStats>,
    /// Breach records keyed by canonical identifier (empty unless enabled)
    pub breach_hits: BTreeMap<String, Vec<BreachRecord>>,
    /// Accounts dropped by `min_confidence_threshold`
    pub below_threshold: u32,
    /// Upserts that failed (logged, never fatal)
    pub persistence_errors: u32,
}

/// One discovery run and everything known about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id
    pub id: Uuid,
    /// Requester this run belongs to
    pub requester: String,
    /// Current lifecycle state
    pub state: JobState,
    /// When the job was accepted (Unix millis)
    pub started_at: i64,
    /// When the job reached a terminal state (Unix millis)
    pub completed_at: Option<i64>,
    /// Coarse progress
    pub progress: JobProgress,
    /// Options the run was started with
    pub options: DiscoveryOptions,
    /// Failure message for failed/timed-out jobs
    pub error: Option<String>,
    /// Final report, when the run produced one
    pub report: Option<DiscoveryReport>,
}

/// What `start_discovery` hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Unique job id
    pub job_id: Uuid,
    /// State at the time of the call
    pub status: JobState,
    /// When the job was accepted (Unix millis)
    pub started_at: i64,
}

/// Point-in-time view of a job, served from the active registry or history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusInfo {
    /// Unique job id
    pub job_id: Uuid,
    /// Requester the job belongs to
    pub requester: String,
    /// Lifecycle state
    pub state: JobState,
    /// When the job was accepted (Unix millis)
    pub started_at: i64,
    /// When the job reached a terminal state (Unix millis)
    pub completed_at: Option<i64>,
    /// Coarse progress
    pub progress: JobProgress,
    /// Failure message, when any
    pub error: Option<String>,
    /// Final report, when the run produced one
    pub report: Option<DiscoveryReport>,
}

impl JobStatusInfo {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            requester: job.requester.clone(),
            state: job.state,
            started_at: job.started_at,
            completed_at: job.completed_at,
            progress: job.progress.clone(),
            error: job.error.clone(),
            report: job.report.clone(),
        }
    }
}

/// Manager-level counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Jobs currently in the active registry
    pub active_jobs: usize,
    /// Terminal jobs retained in history
    pub historical_jobs: usize,
    /// Platforms with a registered adapter
    pub supported_platforms: usize,
}

/// An active job plus its cooperative cancellation flag
struct ActiveJob {
    job: Job,
    cancel: CancelFlag,
}

/// Owns the discovery job lifecycle for a process.
///
/// All mutable state (active registry, history) lives behind the
/// manager's locks; construct once, call [`JobManager::start`] to run
/// the reaper, and [`JobManager::shutdown`] when done.
pub struct JobManager {
    config: JobManagerConfig,
    registry: Arc<PlatformRegistry>,
    profiles: Arc<dyn ProfileSource>,
    store: Arc<dyn AccountStore>,
    breaches: Arc<dyn BreachProvider>,
    clock: Arc<dyn Clock>,
    /// Active jobs keyed by requester — the one-job-per-requester invariant
    /// is structural: a map can't hold two entries under one key.
    active: RwLock<HashMap<String, ActiveJob>>,
    /// Bounded FIFO history of terminal jobs
    history: RwLock<VecDeque<Job>>,
    /// Reaper lifecycle flag
    running: AtomicBool,
    /// Set once shutdown begins; new jobs are rejected afterwards
    shutting_down: AtomicBool,
}

impl JobManager {
    /// Create a manager over the given collaborators.
    ///
    /// Breach lookup defaults to [`NullBreachProvider`] and the clock to
    /// [`TokioClock`]; override with the builder methods.
    pub fn new(
        registry: Arc<PlatformRegistry>,
        profiles: Arc<dyn ProfileSource>,
        store: Arc<dyn AccountStore>,
        config: JobManagerConfig,
    ) -> Self {
        Self {
            config,
            registry,
            profiles,
            store,
            breaches: Arc::new(NullBreachProvider),
            clock: Arc::new(TokioClock),
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Replace the breach provider (builder style, before wrapping in `Arc`)
    pub fn with_breach_provider(mut self, breaches: Arc<dyn BreachProvider>) -> Self {
        self.breaches = breaches;
        self
    }

    /// Replace the clock (builder style, before wrapping in `Arc`)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the background reaper.
    ///
    /// Idempotent. The reaper holds only a weak reference, so dropping
    /// the manager also stops it.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            "Job manager started (cap {}, job timeout {}ms)",
            self.config.max_active_jobs,
            self.config.job_timeout_ms
        );

        let weak: Weak<JobManager> = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.reaper_interval_ms);
        let clock = self.clock.clone();
        tokio::spawn(async move {
            loop {
                clock.sleep(interval).await;
                let manager = match weak.upgrade() {
                    Some(manager) => manager,
                    None => break,
                };
                if !manager.running.load(Ordering::SeqCst) {
                    break;
                }
                let reaped = manager.reap_stale_jobs();
                if reaped > 0 {
                    tracing::warn!("Reaper timed out {} stale job(s)", reaped);
                }
            }
            tracing::debug!("Reaper stopped");
        });
    }

    /// Stop the reaper and request cancellation of every active job.
    ///
    /// Cancellation stays cooperative: in-flight probes drain and the
    /// jobs finalize as `cancelled` on their own tasks.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        let active = self.active.read();
        for active_job in active.values() {
            active_job.cancel.cancel();
        }
        tracing::info!(
            "Job manager shutting down; {} active job(s) cancelled",
            active.len()
        );
    }

    /// Start a discovery run for a requester.
    ///
    /// Idempotent while the requester already has a non-terminal job:
    /// the existing descriptor is returned instead of spawning a
    /// duplicate. Fails with [`Error::CapacityExceeded`] when the global
    /// active-job cap is reached.
    pub fn start_discovery(
        self: &Arc<Self>,
        requester: &str,
        options: DiscoveryOptions,
    ) -> Result<JobDescriptor> {
        let requester = requester.trim();
        if requester.is_empty() {
            return Err(Error::InvalidRequester("requester id is empty".into()));
        }
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShutdownInProgress);
        }
        options.validate()?;

        let (job_id, started_at, cancel) = {
            let mut active = self.active.write();

            if let Some(existing) = active.get(requester) {
                tracing::debug!(
                    "Requester {} already has active job {}; returning it",
                    requester,
                    existing.job.id
                );
                return Ok(JobDescriptor {
                    job_id: existing.job.id,
                    status: existing.job.state,
                    started_at: existing.job.started_at,
                });
            }

            if active.len() >= self.config.max_active_jobs {
                return Err(Error::CapacityExceeded {
                    active: active.len(),
                    cap: self.config.max_active_jobs,
                });
            }

            let job = Job {
                id: Uuid::new_v4(),
                requester: requester.to_string(),
                state: JobState::Starting,
                started_at: self.clock.now_millis(),
                completed_at: None,
                progress: JobProgress::at("starting", 0, "Discovery accepted".into()),
                options: options.clone(),
                error: None,
                report: None,
            };
            let job_id = job.id;
            let started_at = job.started_at;
            let cancel = CancelFlag::new();
            active.insert(
                requester.to_string(),
                ActiveJob {
                    job,
                    cancel: cancel.clone(),
                },
            );
            (job_id, started_at, cancel)
        };

        tracing::info!("Starting discovery job {} for {}", job_id, requester);

        let manager = Arc::clone(self);
        let requester_owned = requester.to_string();
        tokio::spawn(async move {
            manager
                .run_job(requester_owned, job_id, options, cancel)
                .await;
        });

        Ok(JobDescriptor {
            job_id,
            status: JobState::Starting,
            started_at,
        })
    }

    /// Point-in-time status of a job, from the active registry or history
    pub fn get_job_status(&self, job_id: Uuid) -> Option<JobStatusInfo> {
        {
            let active = self.active.read();
            if let Some(active_job) = active.values().find(|a| a.job.id == job_id) {
                return Some(JobStatusInfo::from_job(&active_job.job));
            }
        }
        let history = self.history.read();
        history
            .iter()
            .rev()
            .find(|job| job.id == job_id)
            .map(JobStatusInfo::from_job)
    }

    /// Request cancellation of a job.
    ///
    /// Returns `true` when the job was active and the flag was set. The
    /// scheduler observes the flag only at chunk boundaries; in-flight
    /// probes are allowed to drain, never interrupted.
    pub fn cancel_job(&self, job_id: Uuid) -> bool {
        let active = self.active.read();
        match active.values().find(|a| a.job.id == job_id) {
            Some(active_job) => {
                tracing::info!("Cancellation requested for job {}", job_id);
                active_job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Manager-level counters
    pub fn get_stats(&self) -> ManagerStats {
        ManagerStats {
            active_jobs: self.active.read().len(),
            historical_jobs: self.history.read().len(),
            supported_platforms: self.registry.len(),
        }
    }

    /// Force every `in_progress` job older than the wall-clock budget
    /// into the `timeout` state and move it to history.
    ///
    /// Runs on the reaper interval; callable directly. The orphaned
    /// pipeline task gets its cancel flag set so it stops at the next
    /// chunk boundary; its late finalize is then discarded.
    pub fn reap_stale_jobs(&self) -> usize {
        let now = self.clock.now_millis();
        let budget = self.config.job_timeout_ms as i64;

        let mut active = self.active.write();
        let stale: Vec<String> = active
            .iter()
            .filter(|(_, a)| {
                a.job.state == JobState::InProgress && now - a.job.started_at > budget
            })
            .map(|(requester, _)| requester.clone())
            .collect();

        for requester in &stale {
            if let Some(active_job) = active.remove(requester) {
                active_job.cancel.cancel();
                let mut job = active_job.job;
                tracing::warn!(
                    "Job {} for {} exceeded {}ms budget; forcing timeout",
                    job.id,
                    requester,
                    budget
                );
                job.state = JobState::TimedOut;
                job.completed_at = Some(now);
                job.error = Some(Error::JobTimeout(job.id.to_string()).to_string());
                self.push_history(job);
            }
        }

        stale.len()
    }

    // ========================================================================
    // PIPELINE
    // ========================================================================

    /// The discovery pipeline for one job. Runs on its own task; every
    /// exit path funnels through `finalize`.
    async fn run_job(
        self: Arc<Self>,
        requester: String,
        job_id: Uuid,
        options: DiscoveryOptions,
        cancel: CancelFlag,
    ) {
        self.transition(&requester, job_id, JobState::InProgress);
        self.update_progress(
            &requester,
            job_id,
            JobProgress::at("preparing_identifiers", 5, "Preparing identifiers".into()),
        );

        let profile = match self.profiles.load_profile(&requester).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                let error = Error::InvalidRequester(format!("unknown requester {}", requester));
                return self.finalize(&requester, job_id, JobState::Failed, Some(error), None);
            }
            Err(error) => {
                let error = Error::ProfileLookupFailed(format!("{}: {}", requester, error));
                return self.finalize(&requester, job_id, JobState::Failed, Some(error), None);
            }
        };

        let identifiers = prepare_identifiers(&profile);
        if identifiers.is_empty() {
            return self.finalize(
                &requester,
                job_id,
                JobState::Failed,
                Some(Error::EmptyProfile),
                None,
            );
        }

        self.update_progress(
            &requester,
            job_id,
            JobProgress::at("selecting_platforms", 10, "Selecting platforms".into()),
        );
        let platforms = select_platforms(self.registry.snapshot(), &options);
        let tasks = build_tasks(&platforms, &identifiers, &self.registry);
        tracing::info!(
            "Job {}: {} identifiers × {} platforms -> {} tasks",
            job_id,
            identifiers.len(),
            platforms.len(),
            tasks.len()
        );

        let executor = ProbeExecutor::new(self.registry.clone(), self.clock.clone(), &self.config);
        let results = executor
            .run(tasks, &options, &cancel, |settled, total| {
                // 10% -> 80% across the probing phase
                let percentage = 10 + ((settled as u64 * 70) / total.max(1) as u64) as u8;
                self.update_progress(
                    &requester,
                    job_id,
                    JobProgress::at(
                        "probing",
                        percentage,
                        format!("Probed {}/{} tasks", settled, total),
                    ),
                );
            })
            .await;
        let was_cancelled = cancel.is_cancelled();

        self.update_progress(
            &requester,
            job_id,
            JobProgress::at("aggregating", 85, "Aggregating results".into()),
        );
        let aggregation = aggregate(&results);

        let breach_hits = if options.enable_breach_data_lookup {
            correlate_breaches(&*self.breaches, &identifiers).await
        } else {
            BTreeMap::new()
        };

        let total_accounts = aggregation.accounts.len();
        let accounts: Vec<DiscoveredAccount> = aggregation
            .accounts
            .into_iter()
            .filter(|a| a.confidence >= options.min_confidence_threshold)
            .collect();
        let below_threshold = (total_accounts - accounts.len()) as u32;

        self.update_progress(
            &requester,
            job_id,
            JobProgress::at(
                "persisting",
                95,
                format!("Persisting {} accounts", accounts.len()),
            ),
        );
        let mut persistence_errors = 0u32;
        for account in &accounts {
            if let Err(error) = self.store.upsert_account(&requester, account.clone()).await {
                tracing::warn!(
                    "Job {}: upsert of {}:{} failed: {}",
                    job_id,
                    account.platform_key,
                    account.canonical_identifier,
                    error
                );
                persistence_errors += 1;
            }
        }

        let report = DiscoveryReport {
            accounts,
            platform_stats: aggregation.platform_stats,
            source_stats: aggregation.source_stats,
            breach_hits,
            below_threshold,
            persistence_errors,
        };

        let state = if was_cancelled {
            JobState::Cancelled
        } else {
            JobState::Completed
        };
        self.finalize(&requester, job_id, state, None, Some(report));
    }

    /// Update a live job's progress; no-op once the job left the registry.
    fn update_progress(&self, requester: &str, job_id: Uuid, progress: JobProgress) {
        let mut active = self.active.write();
        if let Some(active_job) = active.get_mut(requester) {
            if active_job.job.id == job_id && !active_job.job.state.is_terminal() {
                active_job.job.progress = progress;
            }
        }
    }

    /// Apply a non-terminal state transition on a live job.
    fn transition(&self, requester: &str, job_id: Uuid, next: JobState) {
        let mut active = self.active.write();
        if let Some(active_job) = active.get_mut(requester) {
            if active_job.job.id == job_id {
                if active_job.job.state.can_transition_to(next) {
                    active_job.job.state = next;
                } else {
                    tracing::error!(
                        "Job {}: illegal transition {} -> {}",
                        job_id,
                        active_job.job.state,
                        next
                    );
                }
            }
        }
    }

    /// Move a job into a terminal state and onto the history queue.
    ///
    /// Discards the result when the job already left the active registry
    /// (the reaper got there first).
    fn finalize(
        &self,
        requester: &str,
        job_id: Uuid,
        state: JobState,
        error: Option<Error>,
        report: Option<DiscoveryReport>,
    ) {
        debug_assert!(state.is_terminal());

        let mut active = self.active.write();
        let owns_job = matches!(
            active.get(requester),
            Some(active_job) if active_job.job.id == job_id && !active_job.job.state.is_terminal()
        );
        let removed = if owns_job { active.remove(requester) } else { None };
        let Some(ActiveJob { mut job, .. }) = removed else {
            tracing::debug!("Job {} already finalized elsewhere; discarding result", job_id);
            return;
        };
        job.state = state;
        job.completed_at = Some(self.clock.now_millis());
        job.error = error.map(|e| e.to_string());
        job.report = report;
        match state {
            JobState::Completed => {
                job.progress = JobProgress::at("done", 100, "Discovery completed".into());
            }
            JobState::Cancelled => {
                job.progress.step = "done".into();
                job.progress.message = "Discovery cancelled".into();
            }
            _ => {}
        }
        drop(active);

        match state {
            JobState::Completed => tracing::info!(
                "Job {} completed: {} account(s) found",
                job_id,
                job.report.as_ref().map(|r| r.accounts.len()).unwrap_or(0)
            ),
            JobState::Failed => {
                tracing::warn!("Job {} failed: {}", job_id, job.error.as_deref().unwrap_or("?"))
            }
            _ => tracing::info!("Job {} finished as {}", job_id, state),
        }

        self.push_history(job);
    }

    /// Append a terminal job to history, evicting strict FIFO beyond
    /// the configured capacity.
    fn push_history(&self, job: Job) {
        let mut history = self.history.write();
        history.push_back(job);
        while history.len() > self.config.history_capacity {
            if let Some(evicted) = history.pop_front() {
                tracing::debug!("History full; evicted job {}", evicted.id);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
