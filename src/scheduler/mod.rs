//! # Task Scheduler / Probe Executor
//!
//! Builds the identifier×platform task set and executes it in
//! concurrency-bounded chunks with per-task timeout and bounded retry.
//!
//! ## Execution Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CHUNKED FAN-OUT                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  tasks = platforms × identifiers, minus unsupported pairs               │
//! │                                                                         │
//! │  ┌ chunk 1 (≤ maxConcurrentDiscoveries) ┐                               │
//! │  │  probe  probe  probe  probe  probe   │  ── all settle ──┐            │
//! │  └──────────────────────────────────────┘                  │            │
//! │                 inter-chunk delay  ◄───────────────────────┘            │
//! │                 cancel flag checked here                                │
//! │  ┌ chunk 2 ─────────────────────────────┐                               │
//! │  │  ...                                 │                               │
//! │  └──────────────────────────────────────┘                               │
//! │                                                                         │
//! │  Ordering: none within a chunk; strict between chunks. The chunk       │
//! │  boundary exists purely to bound burst request rate.                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single Task
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SINGLE TASK EXECUTION                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   timeout(discoveryTimeoutMs) races:                                    │
//! │                                                                         │
//! │     attempt 1 ── transport error ──► backoff(1) ──► attempt 2 ── ...    │
//! │         │                                                               │
//! │         └─ Ok(outcome) ──► ProbeResult { success: true }                │
//! │                                                                         │
//! │   Retry applies only to the adapter call. A task's failure is           │
//! │   captured on its ProbeResult and never aborts sibling tasks.           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identifiers::Identifier;
use crate::options::{DiscoveryOptions, JobManagerConfig};
use crate::platforms::{DetectionMethod, PlatformAdapter, PlatformInfo, PlatformRegistry, ProbeOutcome};
use crate::time::Clock;

/// Upper bound on a single retry backoff delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// One scheduled probe: a platform paired with an identifier
///
/// Ephemeral; tasks exist only between scheduling and settlement.
#[derive(Debug, Clone)]
pub struct DiscoveryTask {
    /// Platform to probe
    pub platform_key: String,
    /// Identifier to probe with
    pub identifier: Identifier,
}

/// Settled outcome of one task, success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Platform that was probed
    pub platform_key: String,
    /// Identifier the probe used
    pub identifier: Identifier,
    /// Tri-state existence outcome (meaningless when `success` is false)
    pub exists: Option<bool>,
    /// Adapter-reported confidence, if any
    pub confidence: Option<u8>,
    /// Detection method, when the probe settled successfully
    pub method: Option<DetectionMethod>,
    /// Public profile URL, when found
    pub profile_url: Option<String>,
    /// Adapter-specific metadata
    pub metadata: BTreeMap<String, String>,
    /// Whether the probe settled without error
    pub success: bool,
    /// Failure reason for unsuccessful probes
    pub error_reason: Option<String>,
}

impl ProbeResult {
    fn settled(task: &DiscoveryTask, outcome: ProbeOutcome) -> Self {
        Self {
            platform_key: task.platform_key.clone(),
            identifier: task.identifier.clone(),
            exists: outcome.exists,
            confidence: outcome.confidence,
            method: Some(outcome.method),
            profile_url: outcome.profile_url,
            metadata: outcome.metadata,
            success: true,
            error_reason: None,
        }
    }

    fn failed(task: &DiscoveryTask, error: &Error) -> Self {
        Self {
            platform_key: task.platform_key.clone(),
            identifier: task.identifier.clone(),
            exists: None,
            confidence: None,
            method: None,
            profile_url: None,
            metadata: BTreeMap::new(),
            success: false,
            error_reason: Some(error.to_string()),
        }
    }
}

/// Cooperative cancellation flag shared between a job and its executor.
///
/// Setting the flag never interrupts in-flight probes; the executor only
/// consults it at chunk boundaries and lets the current chunk drain.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build the task set: the cross-join of platforms and identifiers,
/// dropping every pair the platform's adapter does not support.
///
/// Given fixed inputs and a deterministic registry, the returned set is
/// fully determined (platform-major order). Platforms with no registered
/// adapter contribute no tasks.
pub fn build_tasks(
    platforms: &[PlatformInfo],
    identifiers: &[Identifier],
    registry: &PlatformRegistry,
) -> Vec<DiscoveryTask> {
    let mut tasks = Vec::new();
    for platform in platforms {
        let adapter = match registry.adapter(&platform.key) {
            Some(adapter) => adapter,
            None => {
                tracing::warn!("Platform {} has no adapter; skipping", platform.key);
                continue;
            }
        };
        for identifier in identifiers {
            if adapter.supports_identifier_type(identifier.kind) {
                tasks.push(DiscoveryTask {
                    platform_key: platform.key.clone(),
                    identifier: identifier.clone(),
                });
            }
        }
    }
    tasks
}

/// Backoff delay before retry number `attempt` (1-based).
///
/// Pure function: doubles from the base each attempt and is capped at
/// [`MAX_RETRY_DELAY`]. `retry_delay(1, base) == base`.
pub fn retry_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Executes a task set in concurrency-bounded chunks.
///
/// Holds no per-job state; one executor can serve any number of runs.
pub struct ProbeExecutor {
    registry: Arc<PlatformRegistry>,
    clock: Arc<dyn Clock>,
    inter_chunk_delay: Duration,
    max_attempts: u32,
    retry_base: Duration,
}

impl ProbeExecutor {
    /// Create an executor over a registry, pacing and retry policy taken
    /// from the manager configuration.
    pub fn new(
        registry: Arc<PlatformRegistry>,
        clock: Arc<dyn Clock>,
        config: &JobManagerConfig,
    ) -> Self {
        Self {
            registry,
            clock,
            inter_chunk_delay: Duration::from_millis(config.inter_chunk_delay_ms),
            max_attempts: config.max_probe_attempts.max(1),
            retry_base: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Run the whole task set and return every settled result.
    ///
    /// Chunks of `options.chunk_size()` run concurrently; chunk N+1 never
    /// starts before chunk N fully settles plus the inter-chunk delay.
    /// `on_progress(settled, total)` fires after each chunk. When the
    /// cancel flag is observed at a chunk boundary the remaining chunks
    /// are skipped and whatever already settled is returned.
    pub async fn run(
        &self,
        tasks: Vec<DiscoveryTask>,
        options: &DiscoveryOptions,
        cancel: &CancelFlag,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Vec<ProbeResult> {
        let total = tasks.len();
        let chunk_size = options.chunk_size();
        let mut results: Vec<ProbeResult> = Vec::with_capacity(total);

        let chunks: Vec<&[DiscoveryTask]> = tasks.chunks(chunk_size).collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Cancellation observed at chunk boundary {}/{}; {} tasks skipped",
                    index,
                    chunk_count,
                    total - results.len()
                );
                break;
            }

            tracing::debug!(
                "Executing chunk {}/{} ({} tasks)",
                index + 1,
                chunk_count,
                chunk.len()
            );

            // Settle-all: every task resolves to a ProbeResult, errors
            // included, so one failure cannot abort its siblings.
            let settled = join_all(chunk.iter().map(|task| self.execute_task(task, options))).await;
            results.extend(settled);
            on_progress(results.len(), total);

            let last = index + 1 == chunk_count;
            if !last && !self.inter_chunk_delay.is_zero() {
                self.clock.sleep(self.inter_chunk_delay).await;
            }
        }

        results
    }

    /// Execute one task: adapter lookup, then the retry loop raced
    /// against the per-task deadline.
    async fn execute_task(&self, task: &DiscoveryTask, options: &DiscoveryOptions) -> ProbeResult {
        let adapter = match self.registry.adapter(&task.platform_key) {
            Some(adapter) => adapter,
            None => {
                let error = Error::AdapterMissing(task.platform_key.clone());
                tracing::warn!("{}", error);
                return ProbeResult::failed(task, &error);
            }
        };

        let deadline = Duration::from_millis(options.discovery_timeout_ms);
        match tokio::time::timeout(deadline, self.probe_with_retry(&*adapter, task, options)).await
        {
            Ok(Ok(outcome)) => ProbeResult::settled(task, outcome),
            Ok(Err(error)) => {
                tracing::debug!(
                    "Probe of {} with {} failed: {}",
                    task.platform_key,
                    task.identifier.value,
                    error
                );
                ProbeResult::failed(task, &error)
            }
            Err(_) => {
                let error = Error::TaskTimeout {
                    platform: task.platform_key.clone(),
                    timeout_ms: options.discovery_timeout_ms,
                };
                tracing::debug!("{}", error);
                ProbeResult::failed(task, &error)
            }
        }
    }

    /// The capability call with bounded retry. Backoff applies only
    /// here, never to the surrounding orchestration, and only
    /// recoverable (transport-class) errors are retried.
    async fn probe_with_retry(
        &self,
        adapter: &dyn PlatformAdapter,
        task: &DiscoveryTask,
        options: &DiscoveryOptions,
    ) -> Result<ProbeOutcome> {
        let mut attempt = 1u32;
        loop {
            match adapter
                .discover(&task.identifier.value, task.identifier.kind, options)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_recoverable() && attempt < self.max_attempts => {
                    let delay = retry_delay(attempt, self.retry_base);
                    tracing::debug!(
                        "Probe of {} attempt {}/{} failed ({}); retrying in {:?}",
                        task.platform_key,
                        attempt,
                        self.max_attempts,
                        error,
                        delay
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
