//! # Result Aggregator
//!
//! Scores, deduplicates, and summarizes settled probe results into
//! discovered accounts plus per-platform and per-identifier statistics.
//!
//! ## Confidence Scoring
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CONFIDENCE SCORING                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  confidence = probe confidence (default 50 when absent)                 │
//! │             + provenance bonus        + detection-method bonus          │
//! │               primary email   +20       password-reset flow  +15       │
//! │               alternate email +15       verified API lookup  +20       │
//! │               phone           +10       public profile check +10       │
//! │               username        +5        enumeration          +12       │
//! │                                                                         │
//! │  clamped to [0, 100]                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deduplication
//!
//! Positive results are grouped by (platform, account handle). Adapters
//! that can name the account they found (an id in metadata, or a profile
//! URL) get per-handle grouping; adapters that can't have all their hits
//! on a platform collapsed into one account, since probing two of the
//! requester's emails against the same platform almost always finds the
//! same underlying account. Within a group the highest-confidence probe
//! wins and supplies the canonical identifier; metadata is unioned across
//! the group.
//!
//! ## Unknown Outcomes
//!
//! `exists: None` (probed fine, could not determine) is tallied in its
//! own `unknown` counter. It is never treated as "absent", never counted
//! as an error, and never produces an account.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::breach::{BreachProvider, BreachRecord};
use crate::identifiers::{Identifier, IdentifierKind, IdentifierSource};
use crate::platforms::DetectionMethod;
use crate::scheduler::ProbeResult;
use crate::time::now_timestamp;

/// Probe confidence assumed when the adapter reports none
pub const DEFAULT_PROBE_CONFIDENCE: u8 = 50;

/// Metadata key under which an adapter may name the account it found
pub const ACCOUNT_ID_METADATA_KEY: &str = "account_id";

/// Confidence bonus contributed by an identifier's provenance
pub fn provenance_bonus(source: IdentifierSource) -> u8 {
    match source {
        IdentifierSource::PrimaryEmail => 20,
        IdentifierSource::AlternateEmail => 15,
        IdentifierSource::Phone => 10,
        // All username-class identifiers, declared or derived
        IdentifierSource::ExplicitUsername
        | IdentifierSource::EmailVariation
        | IdentifierSource::NameVariation => 5,
    }
}

/// Score a positive probe result, clamped to [0, 100].
pub fn score_result(result: &ProbeResult) -> u8 {
    let base = result.confidence.unwrap_or(DEFAULT_PROBE_CONFIDENCE) as u16;
    let provenance = provenance_bonus(result.identifier.source) as u16;
    let method = result
        .method
        .map(|m| m.confidence_bonus() as u16)
        .unwrap_or(0);
    (base + provenance + method).min(100) as u8
}

/// An account the engine believes exists, ready for upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredAccount {
    /// Platform the account lives on
    pub platform_key: String,
    /// Canonical identifier that found the account (lowercased)
    pub canonical_identifier: String,
    /// Kind of the winning identifier
    pub identifier_kind: IdentifierKind,
    /// Aggregate confidence (0-100)
    pub confidence: u8,
    /// How the account was detected
    pub method: DetectionMethod,
    /// Public profile URL, when known
    pub profile_url: Option<String>,
    /// Unioned adapter metadata
    pub metadata: BTreeMap<String, String>,
    /// When the account was last verified (Unix timestamp)
    pub last_verified: i64,
}

/// Per-platform probe counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    /// Probes attempted against the platform
    pub searched: u32,
    /// Probes that found an account
    pub found: u32,
    /// Probes that failed (timeout, transport, missing adapter)
    pub errors: u32,
    /// Probes that settled but could not determine existence
    pub unknown: u32,
}

/// Per-identifier-source probe counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Probes attempted with identifiers of this provenance
    pub searched: u32,
    /// Probes of this provenance that found an account
    pub found: u32,
}

/// Everything one aggregation pass produces
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregation {
    /// Deduplicated discovered accounts, highest confidence first
    pub accounts: Vec<DiscoveredAccount>,
    /// Counters keyed by platform
    pub platform_stats: BTreeMap<String, PlatformStats>,
    /// Counters keyed by identifier provenance
    pub source_stats: BTreeMap<IdentifierSource, SourceStats>,
}

/// Grouping key: platform plus the account handle when the adapter
/// provided one. `None` collapses per platform.
fn group_key(result: &ProbeResult) -> (String, Option<String>) {
    let handle = result
        .metadata
        .get(ACCOUNT_ID_METADATA_KEY)
        .cloned()
        .or_else(|| result.profile_url.clone());
    (result.platform_key.clone(), handle)
}

/// Run one aggregation pass over settled probe results.
///
/// Every result is tallied; only successful results with
/// `exists == Some(true)` can produce accounts. The output account list
/// is sorted by descending confidence with the platform key as a stable
/// tie-break.
pub fn aggregate(results: &[ProbeResult]) -> Aggregation {
    let mut platform_stats: BTreeMap<String, PlatformStats> = BTreeMap::new();
    let mut source_stats: BTreeMap<IdentifierSource, SourceStats> = BTreeMap::new();
    let mut groups: BTreeMap<(String, Option<String>), (u8, ProbeResult, BTreeMap<String, String>)> =
        BTreeMap::new();

    for result in results {
        let platform = platform_stats.entry(result.platform_key.clone()).or_default();
        let source = source_stats.entry(result.identifier.source).or_default();
        platform.searched += 1;
        source.searched += 1;

        if !result.success {
            platform.errors += 1;
            continue;
        }

        match result.exists {
            Some(true) => {
                platform.found += 1;
                source.found += 1;

                let confidence = score_result(result);
                let key = group_key(result);
                match groups.get_mut(&key) {
                    Some((best, winner, metadata)) => {
                        // Union metadata; the winner's values take precedence
                        for (k, v) in &result.metadata {
                            metadata.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                        if confidence > *best
                            || (confidence == *best
                                && result.identifier.weight() > winner.identifier.weight())
                        {
                            *best = confidence;
                            *winner = result.clone();
                            for (k, v) in &winner.metadata {
                                metadata.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    None => {
                        groups.insert(key, (confidence, result.clone(), result.metadata.clone()));
                    }
                }
            }
            Some(false) => {}
            None => {
                platform.unknown += 1;
            }
        }
    }

    let now = now_timestamp();
    let mut accounts: Vec<DiscoveredAccount> = groups
        .into_values()
        .map(|(confidence, winner, metadata)| DiscoveredAccount {
            platform_key: winner.platform_key.clone(),
            canonical_identifier: winner.identifier.canonical_value(),
            identifier_kind: winner.identifier.kind,
            confidence,
            // Positive results always carry a method
            method: winner.method.unwrap_or(DetectionMethod::Enumeration),
            profile_url: winner.profile_url.clone(),
            metadata,
            last_verified: now,
        })
        .collect();

    accounts.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| a.platform_key.cmp(&b.platform_key))
    });

    tracing::debug!(
        "Aggregated {} probe results into {} accounts across {} platforms",
        results.len(),
        accounts.len(),
        platform_stats.len()
    );

    Aggregation {
        accounts,
        platform_stats,
        source_stats,
    }
}

/// Attach breach records to each probed identifier.
///
/// Additive only: lookup failures are logged and skipped, and nothing
/// here feeds back into confidence scoring. Returns a map from canonical
/// identifier value to its breach records (identifiers with none are
/// omitted).
pub async fn correlate_breaches(
    provider: &dyn BreachProvider,
    identifiers: &[Identifier],
) -> BTreeMap<String, Vec<BreachRecord>> {
    let mut hits: BTreeMap<String, Vec<BreachRecord>> = BTreeMap::new();
    for identifier in identifiers {
        let canonical = identifier.canonical_value();
        if hits.contains_key(&canonical) {
            continue;
        }
        match provider.breaches_for_identifier(&identifier.value).await {
            Ok(records) if !records.is_empty() => {
                hits.insert(canonical, records);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!("Breach lookup failed for {}: {}", canonical, error);
            }
        }
    }
    hits
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{IdentifierKind, IdentifierSource};
    use async_trait::async_trait;
    use crate::error::Result;

    fn probe(
        platform: &str,
        value: &str,
        source: IdentifierSource,
        exists: Option<bool>,
        confidence: Option<u8>,
        method: Option<DetectionMethod>,
    ) -> ProbeResult {
        let kind = match source {
            IdentifierSource::PrimaryEmail | IdentifierSource::AlternateEmail => {
                IdentifierKind::Email
            }
            IdentifierSource::Phone => IdentifierKind::Phone,
            _ => IdentifierKind::Username,
        };
        ProbeResult {
            platform_key: platform.to_string(),
            identifier: Identifier {
                kind,
                value: value.to_string(),
                source,
            },
            exists,
            confidence,
            method,
            profile_url: None,
            metadata: BTreeMap::new(),
            success: true,
            error_reason: None,
        }
    }

    fn failed_probe(platform: &str, value: &str) -> ProbeResult {
        ProbeResult {
            success: false,
            error_reason: Some("transport".into()),
            exists: None,
            ..probe(
                platform,
                value,
                IdentifierSource::PrimaryEmail,
                None,
                None,
                None,
            )
        }
    }

    #[test]
    fn test_primary_email_password_reset_clamps_to_100() {
        // probe 70 + primary email 20 + password reset 15 = 105 -> 100
        let result = probe(
            "p",
            "jdoe@example.com",
            IdentifierSource::PrimaryEmail,
            Some(true),
            Some(70),
            Some(DetectionMethod::PasswordResetFlow),
        );
        assert_eq!(score_result(&result), 100);
    }

    #[test]
    fn test_default_probe_confidence_applies() {
        // default 50 + username 5 + public profile 10 = 65
        let result = probe(
            "p",
            "jdoe",
            IdentifierSource::ExplicitUsername,
            Some(true),
            None,
            Some(DetectionMethod::PublicProfileCheck),
        );
        assert_eq!(score_result(&result), 65);
    }

    #[test]
    fn test_confidence_always_in_range() {
        for confidence in [None, Some(0), Some(55), Some(100), Some(255)] {
            for method in [
                Some(DetectionMethod::PasswordResetFlow),
                Some(DetectionMethod::VerifiedApiLookup),
                None,
            ] {
                let result = probe(
                    "p",
                    "x@example.com",
                    IdentifierSource::PrimaryEmail,
                    Some(true),
                    confidence,
                    method,
                );
                assert!(score_result(&result) <= 100);
            }
        }
    }

    #[test]
    fn test_same_platform_dedupes_to_highest_confidence() {
        // Primary email at 60 beats alternate email at 55
        let results = vec![
            probe(
                "p",
                "main@example.com",
                IdentifierSource::PrimaryEmail,
                Some(true),
                Some(60),
                Some(DetectionMethod::PublicProfileCheck),
            ),
            probe(
                "p",
                "alt@example.com",
                IdentifierSource::AlternateEmail,
                Some(true),
                Some(55),
                Some(DetectionMethod::PublicProfileCheck),
            ),
        ];

        let aggregation = aggregate(&results);
        assert_eq!(aggregation.accounts.len(), 1);
        let account = &aggregation.accounts[0];
        assert_eq!(account.canonical_identifier, "main@example.com");
        // 60 + 20 + 10
        assert_eq!(account.confidence, 90);
        // Both probes still counted as found
        assert_eq!(aggregation.platform_stats["p"].found, 2);
    }

    #[test]
    fn test_distinct_account_handles_stay_separate() {
        let mut a = probe(
            "p",
            "jdoe",
            IdentifierSource::ExplicitUsername,
            Some(true),
            Some(60),
            Some(DetectionMethod::PublicProfileCheck),
        );
        a.metadata
            .insert(ACCOUNT_ID_METADATA_KEY.into(), "111".into());
        let mut b = probe(
            "p",
            "johnd",
            IdentifierSource::ExplicitUsername,
            Some(true),
            Some(60),
            Some(DetectionMethod::PublicProfileCheck),
        );
        b.metadata
            .insert(ACCOUNT_ID_METADATA_KEY.into(), "222".into());

        let aggregation = aggregate(&[a, b]);
        assert_eq!(aggregation.accounts.len(), 2);
    }

    #[test]
    fn test_metadata_unioned_across_group() {
        let mut a = probe(
            "p",
            "main@example.com",
            IdentifierSource::PrimaryEmail,
            Some(true),
            Some(60),
            Some(DetectionMethod::PublicProfileCheck),
        );
        a.metadata.insert("display_name".into(), "J. Doe".into());
        let mut b = probe(
            "p",
            "alt@example.com",
            IdentifierSource::AlternateEmail,
            Some(true),
            Some(40),
            Some(DetectionMethod::PublicProfileCheck),
        );
        b.metadata.insert("avatar_url".into(), "https://example.com/a.png".into());

        let aggregation = aggregate(&[a, b]);
        let account = &aggregation.accounts[0];
        assert_eq!(account.metadata["display_name"], "J. Doe");
        assert_eq!(account.metadata["avatar_url"], "https://example.com/a.png");
    }

    #[test]
    fn test_unknown_outcomes_tallied_separately() {
        let results = vec![
            probe(
                "p",
                "a@example.com",
                IdentifierSource::PrimaryEmail,
                None,
                None,
                Some(DetectionMethod::Enumeration),
            ),
            probe(
                "p",
                "b@example.com",
                IdentifierSource::AlternateEmail,
                Some(false),
                None,
                Some(DetectionMethod::Enumeration),
            ),
            failed_probe("p", "c@example.com"),
        ];

        let aggregation = aggregate(&results);
        assert!(aggregation.accounts.is_empty());
        let stats = &aggregation.platform_stats["p"];
        assert_eq!(stats.searched, 3);
        assert_eq!(stats.found, 0);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_source_stats_counted() {
        let results = vec![
            probe(
                "p",
                "main@example.com",
                IdentifierSource::PrimaryEmail,
                Some(true),
                Some(60),
                Some(DetectionMethod::PublicProfileCheck),
            ),
            probe(
                "q",
                "main@example.com",
                IdentifierSource::PrimaryEmail,
                Some(false),
                None,
                Some(DetectionMethod::Enumeration),
            ),
            probe(
                "p",
                "jdoe",
                IdentifierSource::NameVariation,
                Some(true),
                None,
                Some(DetectionMethod::PublicProfileCheck),
            ),
        ];

        let aggregation = aggregate(&results);
        let primary = &aggregation.source_stats[&IdentifierSource::PrimaryEmail];
        assert_eq!(primary.searched, 2);
        assert_eq!(primary.found, 1);
        let name = &aggregation.source_stats[&IdentifierSource::NameVariation];
        assert_eq!(name.searched, 1);
        assert_eq!(name.found, 1);
    }

    #[test]
    fn test_accounts_sorted_by_confidence() {
        let results = vec![
            probe(
                "low",
                "jdoe",
                IdentifierSource::NameVariation,
                Some(true),
                Some(10),
                Some(DetectionMethod::Enumeration),
            ),
            probe(
                "high",
                "main@example.com",
                IdentifierSource::PrimaryEmail,
                Some(true),
                Some(70),
                Some(DetectionMethod::VerifiedApiLookup),
            ),
        ];

        let aggregation = aggregate(&results);
        assert_eq!(aggregation.accounts[0].platform_key, "high");
        assert_eq!(aggregation.accounts[1].platform_key, "low");
    }

    struct StaticBreachProvider;

    #[async_trait]
    impl BreachProvider for StaticBreachProvider {
        async fn breaches_for_identifier(&self, value: &str) -> Result<Vec<BreachRecord>> {
            if value.contains("breached") {
                Ok(vec![BreachRecord {
                    source: "example-2021".into(),
                    breached_at: Some(1_612_137_600),
                    data_classes: vec!["emails".into()],
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn test_breach_correlation_is_additive() {
        let identifiers = vec![
            Identifier {
                kind: IdentifierKind::Email,
                value: "breached@example.com".into(),
                source: IdentifierSource::PrimaryEmail,
            },
            Identifier {
                kind: IdentifierKind::Email,
                value: "clean@example.com".into(),
                source: IdentifierSource::AlternateEmail,
            },
        ];

        let hits = correlate_breaches(&StaticBreachProvider, &identifiers).await;
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key("breached@example.com"));
    }
}
