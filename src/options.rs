//! Configuration for discovery runs and the job manager.
//!
//! [`DiscoveryOptions`] travels with a single job and shapes what gets
//! probed and how fast; [`JobManagerConfig`] is process-scoped and governs
//! the job lifecycle (capacity, timeouts, history retention).

use serde::{Deserialize, Serialize};

/// Default number of probes executed concurrently per chunk
pub const DEFAULT_MAX_CONCURRENT_DISCOVERIES: usize = 5;

/// Default per-probe deadline in milliseconds
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

/// Options recognized for a single discovery run
///
/// All fields have serde defaults so callers can submit a partial JSON
/// object and get sensible behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryOptions {
    /// Only probe these platform keys (intersected with the registry)
    pub include_platforms: Vec<String>,
    /// Never probe these platform keys
    pub exclude_platforms: Vec<String>,
    /// Restrict to platforms flagged as popular
    pub popular_only: bool,
    /// Restrict to a single platform category (case-insensitive)
    pub category: Option<String>,
    /// Upper bound on probes in flight at once (chunk size)
    pub max_concurrent_discoveries: usize,
    /// Per-probe deadline, covering the adapter call and its retries
    pub discovery_timeout_ms: u64,
    /// Drop discovered accounts scoring below this threshold (0-100)
    pub min_confidence_threshold: u8,
    /// Attach breach records to probed identifiers
    pub enable_breach_data_lookup: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include_platforms: Vec::new(),
            exclude_platforms: Vec::new(),
            popular_only: false,
            category: None,
            max_concurrent_discoveries: DEFAULT_MAX_CONCURRENT_DISCOVERIES,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            min_confidence_threshold: 0,
            enable_breach_data_lookup: false,
        }
    }
}

impl DiscoveryOptions {
    /// Chunk size for the executor, never zero.
    pub fn chunk_size(&self) -> usize {
        self.max_concurrent_discoveries.max(1)
    }

    /// Validate option values that have hard bounds.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.min_confidence_threshold > 100 {
            return Err(crate::error::Error::InvalidOptions(format!(
                "minConfidenceThreshold must be 0-100, got {}",
                self.min_confidence_threshold
            )));
        }
        if self.discovery_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidOptions(
                "discoveryTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Process-scoped configuration for the job manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobManagerConfig {
    /// Global cap on simultaneously active jobs across all requesters
    pub max_active_jobs: usize,
    /// Wall-clock budget for a whole run before the reaper forces `timeout`
    pub job_timeout_ms: u64,
    /// How often the background reaper scans for stale jobs
    pub reaper_interval_ms: u64,
    /// Bounded FIFO history size for terminal jobs
    pub history_capacity: usize,
    /// Pause between chunks, bounding aggregate request rate
    pub inter_chunk_delay_ms: u64,
    /// Max attempts for a single probe (first try plus retries)
    pub max_probe_attempts: u32,
    /// Base delay for retry backoff; grows with each attempt
    pub retry_base_delay_ms: u64,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_active_jobs: 10,
            job_timeout_ms: 10 * 60 * 1000,
            reaper_interval_ms: 30_000,
            history_capacity: 100,
            inter_chunk_delay_ms: 500,
            max_probe_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_options_default() {
        let options = DiscoveryOptions::default();

        assert!(options.include_platforms.is_empty());
        assert!(options.exclude_platforms.is_empty());
        assert!(!options.popular_only);
        assert_eq!(
            options.max_concurrent_discoveries,
            DEFAULT_MAX_CONCURRENT_DISCOVERIES
        );
        assert_eq!(options.discovery_timeout_ms, DEFAULT_DISCOVERY_TIMEOUT_MS);
        assert_eq!(options.min_confidence_threshold, 0);
        assert!(!options.enable_breach_data_lookup);
    }

    #[test]
    fn test_options_partial_json() {
        let options: DiscoveryOptions =
            serde_json::from_str(r#"{"popularOnly": true, "maxConcurrentDiscoveries": 2}"#)
                .unwrap();

        assert!(options.popular_only);
        assert_eq!(options.max_concurrent_discoveries, 2);
        // Everything else falls back to defaults
        assert_eq!(options.discovery_timeout_ms, DEFAULT_DISCOVERY_TIMEOUT_MS);
    }

    #[test]
    fn test_chunk_size_never_zero() {
        let options = DiscoveryOptions {
            max_concurrent_discoveries: 0,
            ..Default::default()
        };
        assert_eq!(options.chunk_size(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let options = DiscoveryOptions {
            min_confidence_threshold: 101,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let options = DiscoveryOptions {
            discovery_timeout_ms: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_job_manager_config_default() {
        let config = JobManagerConfig::default();

        assert_eq!(config.max_active_jobs, 10);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.max_probe_attempts, 3);
    }
}
