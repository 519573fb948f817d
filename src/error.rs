//! # Error Handling
//!
//! This module provides the error types for Unveil Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Validation Errors                                                  │
//! │  │   ├── InvalidRequester      - Bad or missing requester id            │
//! │  │   ├── EmptyProfile          - Profile yields no identifiers          │
//! │  │   └── InvalidOptions        - Malformed discovery options            │
//! │  │                                                                      │
//! │  ├── Job Errors                                                         │
//! │  │   ├── CapacityExceeded      - Global active-job cap reached          │
//! │  │   ├── JobNotFound           - Unknown job id                         │
//! │  │   ├── JobTimeout            - Run exceeded its wall-clock budget     │
//! │  │   └── ShutdownInProgress    - Manager is shutting down               │
//! │  │                                                                      │
//! │  ├── Task Errors                                                        │
//! │  │   ├── TaskTimeout           - Single probe exceeded its deadline     │
//! │  │   ├── TaskTransport         - Network/adapter failure on a probe     │
//! │  │   └── AdapterMissing        - Platform has no registered adapter     │
//! │  │                                                                      │
//! │  ├── Persistence Errors                                                 │
//! │  │   ├── PersistenceError      - A single account upsert failed         │
//! │  │   └── ProfileLookupFailed   - Requester profile could not be read    │
//! │  │                                                                      │
//! │  └── Internal Errors                                                    │
//! │      ├── SerializationError    - serde round-trip failure               │
//! │      └── Internal              - Should not happen in normal operation  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PROPAGATION POLICY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Task level      TaskTimeout / TaskTransport / AdapterMissing are       │
//! │  ──────────      always swallowed by the executor, recorded on the      │
//! │                  failed ProbeResult, and tallied per platform. They     │
//! │                  never bubble to the job level.                         │
//! │                                                                         │
//! │  Job level       ProfileLookupFailed and validation failures mark       │
//! │  ─────────       the job `failed` with a message and move it to         │
//! │                  history. JobTimeout is enforced by the reaper.         │
//! │                                                                         │
//! │  Persistence     A failed upsert is logged and counted; the remaining   │
//! │  ───────────     upserts still run. A `completed` job may therefore     │
//! │                  be partial — callers inspect the error counters.       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for Unveil Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Unveil Core
///
/// All errors are categorized by module/domain to make error handling
/// clearer and to provide meaningful error messages to callers.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// Bad or missing requester identifier
    #[error("Invalid requester: {0}")]
    InvalidRequester(String),

    /// The requester's profile contains nothing that can be probed
    #[error("Profile yields no identifiers to probe.")]
    EmptyProfile,

    /// Discovery options are malformed
    #[error("Invalid discovery options: {0}")]
    InvalidOptions(String),

    // ========================================================================
    // Job Errors (200-299)
    // ========================================================================

    /// The global active-job cap has been reached
    #[error("Job capacity exceeded: {active} active jobs (cap {cap})")]
    CapacityExceeded {
        /// Number of currently active jobs
        active: usize,
        /// Configured maximum number of active jobs
        cap: usize,
    },

    /// No job exists with the given id
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The whole run exceeded its wall-clock budget
    #[error("Job {0} exceeded its wall-clock budget")]
    JobTimeout(String),

    /// The job manager is shutting down
    #[error("Job manager is shutting down.")]
    ShutdownInProgress,

    // ========================================================================
    // Task Errors (300-399)
    // ========================================================================

    /// A single probe exceeded its deadline
    #[error("Probe of {platform} timed out after {timeout_ms}ms")]
    TaskTimeout {
        /// Platform key the probe targeted
        platform: String,
        /// The per-task deadline that was exceeded
        timeout_ms: u64,
    },

    /// Network or adapter failure while probing
    #[error("Transport error probing {platform}: {reason}")]
    TaskTransport {
        /// Platform key the probe targeted
        platform: String,
        /// Adapter-reported failure reason
        reason: String,
    },

    /// The platform has no registered adapter
    #[error("No adapter registered for platform: {0}")]
    AdapterMissing(String),

    // ========================================================================
    // Persistence Errors (400-499)
    // ========================================================================

    /// A single account upsert failed
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// The requester's profile could not be loaded
    #[error("Failed to load profile for requester: {0}")]
    ProfileLookupFailed(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Validation
    /// - 200-299: Jobs
    /// - 300-399: Tasks
    /// - 400-499: Persistence
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Validation (100-199)
            Error::InvalidRequester(_) => 100,
            Error::EmptyProfile => 101,
            Error::InvalidOptions(_) => 102,

            // Jobs (200-299)
            Error::CapacityExceeded { .. } => 200,
            Error::JobNotFound(_) => 201,
            Error::JobTimeout(_) => 202,
            Error::ShutdownInProgress => 203,

            // Tasks (300-399)
            Error::TaskTimeout { .. } => 300,
            Error::TaskTransport { .. } => 301,
            Error::AdapterMissing(_) => 302,

            // Persistence (400-499)
            Error::PersistenceError(_) => 400,
            Error::ProfileLookupFailed(_) => 401,

            // Internal (900-999)
            Error::SerializationError(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can potentially be resolved by retrying. The
    /// executor uses this to decide whether a failed probe attempt is
    /// worth another try.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TaskTimeout { .. }
                | Error::TaskTransport { .. }
                | Error::CapacityExceeded { .. }
        )
    }

    /// Check if this error is fatal to the whole job
    ///
    /// Task-level errors are tallied and swallowed; everything else in
    /// the pipeline marks the job failed.
    pub fn is_task_level(&self) -> bool {
        matches!(
            self,
            Error::TaskTimeout { .. } | Error::TaskTransport { .. } | Error::AdapterMissing(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
