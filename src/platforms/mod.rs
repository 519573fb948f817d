//! # Platform Module
//!
//! The platform capability contract, the adapter registry, and the pure
//! platform selector.
//!
//! ## Capability Contract
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PLATFORM ADAPTER CONTRACT                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PlatformAdapter (trait object, one per platform)                       │
//! │  ────────────────────────────────────────────────                       │
//! │                                                                         │
//! │  supports_identifier_type(kind) -> bool                                 │
//! │    Synchronous capability check. The scheduler drops any               │
//! │    (platform, identifier) pair the adapter rejects before a            │
//! │    single request is made.                                             │
//! │                                                                         │
//! │  discover(value, kind, options) -> Result<ProbeOutcome>                 │
//! │    One asynchronous existence check. MUST return Err on transport      │
//! │    failure — never an ambiguous Ok. `exists: None` means "probed       │
//! │    fine, could not determine", which is a distinct outcome from        │
//! │    both "present" and "absent".                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Registry and Selection
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     REGISTRY AND SELECTION FLOW                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  builtin_catalog()          PlatformRegistry          select_platforms  │
//! │  ┌───────────────┐         ┌───────────────┐         ┌──────────────┐  │
//! │  │ key, category │ ──────► │ info+adapter  │ ──────► │ include ∩    │  │
//! │  │ popular,      │ register│ keyed by      │ snapshot│ ∖ exclude    │  │
//! │  │ priority      │         │ platform key  │         │ category/pop │  │
//! │  └───────────────┘         └───────────────┘         │ sort by prio │  │
//! │                                                      └──────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-platform behavior lives entirely behind the trait; there is no
//! platform class hierarchy anywhere in the engine.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::Result;
use crate::identifiers::IdentifierKind;
use crate::options::DiscoveryOptions;

/// How a probe decided an account exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// The platform's password-reset flow acknowledged the identifier
    PasswordResetFlow,
    /// A verified API lookup confirmed the account
    VerifiedApiLookup,
    /// A public profile page was found
    PublicProfileCheck,
    /// Signup/availability enumeration
    Enumeration,
}

impl DetectionMethod {
    /// Confidence bonus contributed by this detection method
    pub fn confidence_bonus(&self) -> u8 {
        match self {
            DetectionMethod::PasswordResetFlow => 15,
            DetectionMethod::VerifiedApiLookup => 20,
            DetectionMethod::PublicProfileCheck => 10,
            DetectionMethod::Enumeration => 12,
        }
    }
}

/// Outcome of a single adapter probe
///
/// `exists` is a tri-state: `Some(true)` (account present), `Some(false)`
/// (account absent), `None` (probed successfully but could not determine).
/// Transport failures are errors, never outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether an account exists, if determinable
    pub exists: Option<bool>,
    /// The adapter's own confidence estimate (0-100), if it has one
    pub confidence: Option<u8>,
    /// How the determination was made
    pub method: DetectionMethod,
    /// Public profile URL, when one was found
    pub profile_url: Option<String>,
    /// Adapter-specific extra fields (display name, avatar URL, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Capability contract implemented by every platform probe
///
/// Concrete implementations live outside this crate (email flows, web
/// lookups); the engine only consumes the contract.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Whether this platform can be probed with the given identifier kind
    fn supports_identifier_type(&self, kind: IdentifierKind) -> bool;

    /// Probe one identifier for account existence.
    ///
    /// Must return `Err` on transport failure rather than an ambiguous
    /// outcome; the executor retries recoverable errors.
    async fn discover(
        &self,
        value: &str,
        kind: IdentifierKind,
        options: &DiscoveryOptions,
    ) -> Result<ProbeOutcome>;
}

/// Static metadata describing a platform in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Stable key ("github", "spotify", ...)
    pub key: String,
    /// Human-readable name
    pub name: String,
    /// Category ("social", "professional", "media", ...)
    pub category: String,
    /// Whether the platform counts as popular for `popularOnly` filtering
    pub popular: bool,
    /// Probe priority; higher probes earlier
    pub priority: u8,
}

impl PlatformInfo {
    /// Convenience constructor for catalog entries
    pub fn new(key: &str, name: &str, category: &str, popular: bool, priority: u8) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            popular,
            priority,
        }
    }
}

/// Built-in catalog of well-known platforms.
///
/// Adapters still have to be registered per platform; the catalog only
/// supplies metadata so deployments don't have to re-declare it.
static BUILTIN_CATALOG: Lazy<Vec<PlatformInfo>> = Lazy::new(|| {
    vec![
        PlatformInfo::new("facebook", "Facebook", "social", true, 100),
        PlatformInfo::new("instagram", "Instagram", "social", true, 95),
        PlatformInfo::new("twitter", "Twitter / X", "social", true, 90),
        PlatformInfo::new("linkedin", "LinkedIn", "professional", true, 85),
        PlatformInfo::new("google", "Google", "services", true, 85),
        PlatformInfo::new("tiktok", "TikTok", "social", true, 80),
        PlatformInfo::new("reddit", "Reddit", "social", true, 75),
        PlatformInfo::new("github", "GitHub", "professional", true, 70),
        PlatformInfo::new("spotify", "Spotify", "media", true, 65),
        PlatformInfo::new("discord", "Discord", "social", true, 60),
        PlatformInfo::new("pinterest", "Pinterest", "social", false, 50),
        PlatformInfo::new("snapchat", "Snapchat", "social", true, 50),
        PlatformInfo::new("twitch", "Twitch", "media", false, 45),
        PlatformInfo::new("steam", "Steam", "gaming", false, 40),
        PlatformInfo::new("tumblr", "Tumblr", "social", false, 30),
    ]
});

/// The built-in platform metadata catalog
pub fn builtin_catalog() -> &'static [PlatformInfo] {
    &BUILTIN_CATALOG
}

/// A registered platform: metadata plus its adapter
struct RegisteredPlatform {
    info: PlatformInfo,
    adapter: Arc<dyn PlatformAdapter>,
}

/// Lookup table mapping platform keys to adapters and metadata
///
/// This is the engine's only source of probe capability. Registration
/// replaces any previous adapter for the same key.
#[derive(Default)]
pub struct PlatformRegistry {
    entries: RwLock<HashMap<String, RegisteredPlatform>>,
}

impl PlatformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for a platform.
    pub fn register(&self, info: PlatformInfo, adapter: Arc<dyn PlatformAdapter>) {
        let key = info.key.clone();
        let replaced = self
            .entries
            .write()
            .insert(key.clone(), RegisteredPlatform { info, adapter })
            .is_some();
        if replaced {
            tracing::warn!("Replaced existing adapter for platform {}", key);
        } else {
            tracing::debug!("Registered adapter for platform {}", key);
        }
    }

    /// Look up the adapter for a platform key
    pub fn adapter(&self, key: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.entries.read().get(key).map(|e| e.adapter.clone())
    }

    /// Metadata for a single platform key
    pub fn info(&self, key: &str) -> Option<PlatformInfo> {
        self.entries.read().get(key).map(|e| e.info.clone())
    }

    /// Snapshot of all registered platform metadata, sorted by key
    pub fn snapshot(&self) -> Vec<PlatformInfo> {
        let mut infos: Vec<PlatformInfo> = self
            .entries
            .read()
            .values()
            .map(|e| e.info.clone())
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Number of registered platforms
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no platform is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Filter and order a registry snapshot according to the run options.
///
/// Pure function: intersect with `include_platforms` when non-empty,
/// subtract `exclude_platforms`, apply category and popularity filters,
/// then sort by descending priority with the key as a stable tie-break.
pub fn select_platforms(
    snapshot: Vec<PlatformInfo>,
    options: &DiscoveryOptions,
) -> Vec<PlatformInfo> {
    let mut selected: Vec<PlatformInfo> = snapshot
        .into_iter()
        .filter(|p| {
            options.include_platforms.is_empty()
                || options.include_platforms.iter().any(|k| k == &p.key)
        })
        .filter(|p| !options.exclude_platforms.iter().any(|k| k == &p.key))
        .filter(|p| !options.popular_only || p.popular)
        .filter(|p| match &options.category {
            Some(category) => p.category.eq_ignore_ascii_case(category),
            None => true,
        })
        .collect();

    selected.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.key.cmp(&b.key)));
    selected
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdapter;

    #[async_trait]
    impl PlatformAdapter for StubAdapter {
        fn supports_identifier_type(&self, kind: IdentifierKind) -> bool {
            kind == IdentifierKind::Email
        }

        async fn discover(
            &self,
            _value: &str,
            _kind: IdentifierKind,
            _options: &DiscoveryOptions,
        ) -> Result<ProbeOutcome> {
            Ok(ProbeOutcome {
                exists: Some(true),
                confidence: Some(70),
                method: DetectionMethod::PublicProfileCheck,
                profile_url: None,
                metadata: BTreeMap::new(),
            })
        }
    }

    fn registry_with(keys: &[&str]) -> PlatformRegistry {
        let registry = PlatformRegistry::new();
        for (i, key) in keys.iter().enumerate() {
            registry.register(
                PlatformInfo::new(key, key, "social", i % 2 == 0, (100 - i * 10) as u8),
                Arc::new(StubAdapter),
            );
        }
        registry
    }

    #[test]
    fn test_method_bonuses() {
        assert_eq!(DetectionMethod::PasswordResetFlow.confidence_bonus(), 15);
        assert_eq!(DetectionMethod::VerifiedApiLookup.confidence_bonus(), 20);
        assert_eq!(DetectionMethod::PublicProfileCheck.confidence_bonus(), 10);
        assert_eq!(DetectionMethod::Enumeration.confidence_bonus(), 12);
    }

    #[test]
    fn test_builtin_catalog_keys_unique() {
        let mut keys: Vec<&str> = builtin_catalog().iter().map(|p| p.key.as_str()).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let registry = registry_with(&["github", "reddit"]);

        assert_eq!(registry.len(), 2);
        assert!(registry.adapter("github").is_some());
        assert!(registry.adapter("myspace").is_none());
        assert_eq!(registry.info("reddit").unwrap().key, "reddit");
    }

    #[test]
    fn test_registry_replace_keeps_len() {
        let registry = registry_with(&["github"]);
        registry.register(
            PlatformInfo::new("github", "GitHub", "professional", true, 70),
            Arc::new(StubAdapter),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.info("github").unwrap().category, "professional");
    }

    #[test]
    fn test_select_include_intersection() {
        let registry = registry_with(&["github", "reddit", "spotify"]);
        let options = DiscoveryOptions {
            include_platforms: vec!["reddit".into(), "myspace".into()],
            ..Default::default()
        };

        let selected = select_platforms(registry.snapshot(), &options);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].key, "reddit");
    }

    #[test]
    fn test_select_exclude_subtraction() {
        let registry = registry_with(&["github", "reddit"]);
        let options = DiscoveryOptions {
            exclude_platforms: vec!["github".into()],
            ..Default::default()
        };

        let selected = select_platforms(registry.snapshot(), &options);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].key, "reddit");
    }

    #[test]
    fn test_select_popular_and_category() {
        let registry = PlatformRegistry::new();
        registry.register(
            PlatformInfo::new("github", "GitHub", "professional", true, 70),
            Arc::new(StubAdapter),
        );
        registry.register(
            PlatformInfo::new("linkedin", "LinkedIn", "Professional", false, 85),
            Arc::new(StubAdapter),
        );
        registry.register(
            PlatformInfo::new("reddit", "Reddit", "social", true, 75),
            Arc::new(StubAdapter),
        );

        let options = DiscoveryOptions {
            popular_only: true,
            category: Some("professional".into()),
            ..Default::default()
        };
        let selected = select_platforms(registry.snapshot(), &options);

        // linkedin dropped (not popular), reddit dropped (wrong category);
        // category match is case-insensitive
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].key, "github");
    }

    #[test]
    fn test_select_ordering_deterministic() {
        let registry = PlatformRegistry::new();
        registry.register(
            PlatformInfo::new("bravo", "Bravo", "social", true, 50),
            Arc::new(StubAdapter),
        );
        registry.register(
            PlatformInfo::new("alpha", "Alpha", "social", true, 50),
            Arc::new(StubAdapter),
        );
        registry.register(
            PlatformInfo::new("zulu", "Zulu", "social", true, 90),
            Arc::new(StubAdapter),
        );

        let selected = select_platforms(registry.snapshot(), &DiscoveryOptions::default());
        let keys: Vec<&str> = selected.iter().map(|p| p.key.as_str()).collect();

        // Priority descending, then key ascending for equal priority
        assert_eq!(keys, vec!["zulu", "alpha", "bravo"]);
    }

    #[test]
    fn test_probe_outcome_serde_roundtrip() {
        let outcome = ProbeOutcome {
            exists: None,
            confidence: Some(40),
            method: DetectionMethod::Enumeration,
            profile_url: Some("https://example.com/u/jdoe".into()),
            metadata: BTreeMap::from([("display_name".to_string(), "J. Doe".to_string())]),
        };

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"enumeration\""));
        let restored: ProbeOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.exists, None);
        assert_eq!(restored.confidence, Some(40));
    }
}
