//! # Unveil Core
//!
//! The account-discovery engine behind the Unveil digital-footprint
//! toolkit: given a requester's known identifiers, it probes a set of
//! platforms for matching accounts, scores what it finds, and reports
//! a deduplicated picture of the requester's online presence.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        UNVEIL CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │ Identifiers │  │  Platforms  │  │  Scheduler  │  │  Aggregator  │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Profile   │  │ - Registry  │  │ - Task set  │  │ - Scoring    │   │
//! │  │ - Variants  │  │ - Adapters  │  │ - Chunking  │  │ - Dedup      │   │
//! │  │ - Weights   │  │ - Selection │  │ - Retries   │  │ - Stats      │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────┬───────┴────────────────┘           │
//! │                                   │                                     │
//! │  ┌─────────────┐  ┌─────────────┐ │ ┌─────────────────────────────────┐│
//! │  │   Storage   │  │   Breach    │ │ │           Jobs                  ││
//! │  │             │  │             │ │ │                                 ││
//! │  │ - Upserts   │  │ - Lookup    │◄┘ │ - State machine                ││
//! │  │ - Profiles  │  │ - Additive  │   │ - Capacity + reaper            ││
//! │  │ - Merging   │  │   only      │   │ - Bounded history              ││
//! │  └─────────────┘  └─────────────┘   └─────────────────────────────────┘│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`time`] - Clock abstraction (wall clock in production, manual in tests)
//! - [`options`] - Discovery options and job manager configuration
//! - [`identifiers`] - Requester profiles and identifier preparation
//! - [`platforms`] - Platform catalog, adapter contract, and selection
//! - [`scheduler`] - Chunked probe execution with timeout and retry
//! - [`aggregator`] - Confidence scoring, deduplication, and statistics
//! - [`breach`] - Optional breach-data enrichment
//! - [`storage`] - Persistence contracts and in-memory implementations
//! - [`jobs`] - Job lifecycle: capacity, cancellation, reaping, history
//!
//! ## Confidence Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CONFIDENCE SCORING                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  score = probe confidence (adapter-reported, default 50)                │
//! │        + provenance bonus  (how trustworthy the identifier is)          │
//! │        + method bonus      (how reliable the detection method is)       │
//! │                                                                         │
//! │  clamped to 0-100. A password-reset confirmation on the requester's    │
//! │  declared primary email scores near the top; an enumeration hit on     │
//! │  a generated username variation scores near the bottom.                │
//! │                                                                         │
//! │  Positive probes that resolve to the same underlying account are       │
//! │  collapsed; the highest-scoring probe wins and names the account.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use unveil_core::{
//!     DiscoveryOptions, JobManager, JobManagerConfig, MemoryAccountStore,
//!     MemoryProfileSource, PlatformRegistry,
//! };
//!
//! let registry = Arc::new(PlatformRegistry::new());
//! // register adapters...
//!
//! let manager = Arc::new(JobManager::new(
//!     registry,
//!     Arc::new(MemoryProfileSource::new()),
//!     Arc::new(MemoryAccountStore::new()),
//!     JobManagerConfig::default(),
//! ));
//! manager.start();
//!
//! let job = manager.start_discovery("alice", DiscoveryOptions::default())?;
//! // poll manager.get_job_status(job.job_id) until terminal
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod aggregator;
pub mod breach;
pub mod error;
pub mod identifiers;
pub mod jobs;
pub mod options;
pub mod platforms;
pub mod scheduler;
pub mod storage;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use aggregator::{Aggregation, DiscoveredAccount, PlatformStats, SourceStats};
pub use breach::{BreachProvider, BreachRecord, NullBreachProvider};
pub use error::{Error, Result};
pub use identifiers::{Identifier, IdentifierKind, IdentifierSource, UserProfile};
pub use jobs::{
    DiscoveryReport, JobDescriptor, JobManager, JobProgress, JobState, JobStatusInfo, ManagerStats,
};
pub use options::{DiscoveryOptions, JobManagerConfig};
pub use platforms::{
    builtin_catalog, DetectionMethod, PlatformAdapter, PlatformInfo, PlatformRegistry,
    ProbeOutcome,
};
pub use scheduler::{CancelFlag, ProbeResult};
pub use storage::{AccountStore, MemoryAccountStore, MemoryProfileSource, ProfileSource};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Unveil Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_builtin_catalog_is_nonempty() {
        assert!(!builtin_catalog().is_empty());
    }
}
