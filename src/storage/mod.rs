//! # Storage Module
//!
//! The persistence contracts the engine consumes, plus in-memory
//! implementations.
//!
//! The engine never owns durable storage; it talks to an [`AccountStore`]
//! for discovered accounts and a [`ProfileSource`] for requester profiles.
//! Both are trait objects so deployments can plug in their database of
//! choice. The in-memory implementations back tests and single-process
//! setups.
//!
//! ## Upsert Semantics
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        UPSERT SEMANTICS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Key: (requester, platform, canonical identifier)                       │
//! │                                                                         │
//! │  Insert when absent. On conflict, merge:                                │
//! │    • confidence      -> max(existing, incoming)                         │
//! │    • metadata        -> union (incoming wins on key conflict)           │
//! │    • last_verified   -> latest                                          │
//! │                                                                         │
//! │  Idempotent by construction: re-delivering the same account after      │
//! │  a crash mid-job changes nothing. There is no transaction between      │
//! │  probing and persistence.                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::aggregator::DiscoveredAccount;
use crate::error::Result;
use crate::identifiers::UserProfile;

/// Persistence contract for discovered accounts
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up a previously stored account
    async fn find_existing_account(
        &self,
        requester: &str,
        platform: &str,
        identifier: &str,
    ) -> Result<Option<DiscoveredAccount>>;

    /// Insert or merge an account, returning the stored row
    async fn upsert_account(
        &self,
        requester: &str,
        account: DiscoveredAccount,
    ) -> Result<DiscoveredAccount>;
}

/// Source of requester profiles
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Load the profile for a requester, `None` when unknown
    async fn load_profile(&self, requester: &str) -> Result<Option<UserProfile>>;
}

/// Merge an incoming account into an existing row: keep the max
/// confidence, union metadata (incoming wins on key conflict), keep the
/// most recent verification timestamp.
pub fn merge_accounts(
    existing: DiscoveredAccount,
    incoming: DiscoveredAccount,
) -> DiscoveredAccount {
    let mut metadata = existing.metadata.clone();
    metadata.extend(incoming.metadata.clone());

    let (confidence, method, profile_url, identifier_kind) =
        if incoming.confidence >= existing.confidence {
            (
                incoming.confidence,
                incoming.method,
                incoming.profile_url.or(existing.profile_url),
                incoming.identifier_kind,
            )
        } else {
            (
                existing.confidence,
                existing.method,
                existing.profile_url.or(incoming.profile_url),
                existing.identifier_kind,
            )
        };

    DiscoveredAccount {
        platform_key: existing.platform_key,
        canonical_identifier: existing.canonical_identifier,
        identifier_kind,
        confidence,
        method,
        profile_url,
        metadata,
        last_verified: existing.last_verified.max(incoming.last_verified),
    }
}

/// In-memory account store keyed by (requester, platform, identifier)
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<(String, String, String), DiscoveredAccount>>,
}

impl MemoryAccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts across all requesters
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// All stored accounts for a requester
    pub fn accounts_for(&self, requester: &str) -> Vec<DiscoveredAccount> {
        let mut accounts: Vec<DiscoveredAccount> = self
            .accounts
            .read()
            .iter()
            .filter(|((r, _, _), _)| r == requester)
            .map(|(_, account)| account.clone())
            .collect();
        accounts.sort_by(|a, b| a.platform_key.cmp(&b.platform_key));
        accounts
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_existing_account(
        &self,
        requester: &str,
        platform: &str,
        identifier: &str,
    ) -> Result<Option<DiscoveredAccount>> {
        let key = (
            requester.to_string(),
            platform.to_string(),
            identifier.to_lowercase(),
        );
        Ok(self.accounts.read().get(&key).cloned())
    }

    async fn upsert_account(
        &self,
        requester: &str,
        account: DiscoveredAccount,
    ) -> Result<DiscoveredAccount> {
        let key = (
            requester.to_string(),
            account.platform_key.clone(),
            account.canonical_identifier.to_lowercase(),
        );
        let mut accounts = self.accounts.write();
        let stored = match accounts.remove(&key) {
            Some(existing) => merge_accounts(existing, account),
            None => account,
        };
        accounts.insert(key, stored.clone());
        Ok(stored)
    }
}

/// In-memory profile source keyed by requester
#[derive(Default)]
pub struct MemoryProfileSource {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfileSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a requester's profile
    pub fn insert(&self, requester: &str, profile: UserProfile) {
        self.profiles.write().insert(requester.to_string(), profile);
    }
}

#[async_trait]
impl ProfileSource for MemoryProfileSource {
    async fn load_profile(&self, requester: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().get(requester).cloned())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::IdentifierKind;
    use crate::platforms::DetectionMethod;
    use std::collections::BTreeMap;

    fn account(platform: &str, identifier: &str, confidence: u8) -> DiscoveredAccount {
        DiscoveredAccount {
            platform_key: platform.to_string(),
            canonical_identifier: identifier.to_string(),
            identifier_kind: IdentifierKind::Email,
            confidence,
            method: DetectionMethod::PublicProfileCheck,
            profile_url: None,
            metadata: BTreeMap::new(),
            last_verified: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_finds() {
        let store = MemoryAccountStore::new();
        store
            .upsert_account("alice", account("github", "jdoe@example.com", 80))
            .await
            .unwrap();

        let found = store
            .find_existing_account("alice", "github", "jdoe@example.com")
            .await
            .unwrap();
        assert_eq!(found.unwrap().confidence, 80);

        let missing = store
            .find_existing_account("bob", "github", "jdoe@example.com")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_upsert_merge_keeps_max_confidence_and_unions_metadata() {
        let store = MemoryAccountStore::new();

        let mut first = account("github", "jdoe@example.com", 80);
        first.metadata.insert("display_name".into(), "J. Doe".into());
        store.upsert_account("alice", first).await.unwrap();

        let mut second = account("github", "jdoe@example.com", 60);
        second
            .metadata
            .insert("avatar_url".into(), "https://example.com/a.png".into());
        let merged = store.upsert_account("alice", second).await.unwrap();

        assert_eq!(merged.confidence, 80);
        assert_eq!(merged.metadata["display_name"], "J. Doe");
        assert_eq!(merged.metadata["avatar_url"], "https://example.com/a.png");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryAccountStore::new();
        let a = account("github", "jdoe@example.com", 80);

        let first = store.upsert_account("alice", a.clone()).await.unwrap();
        let second = store.upsert_account("alice", a).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_identifier_key_is_case_insensitive() {
        let store = MemoryAccountStore::new();
        store
            .upsert_account("alice", account("github", "jdoe@example.com", 80))
            .await
            .unwrap();

        let found = store
            .find_existing_account("alice", "github", "JDoe@Example.com")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_merge_keeps_latest_verification() {
        let mut old = account("github", "jdoe@example.com", 90);
        old.last_verified = 1_000;
        let mut new = account("github", "jdoe@example.com", 50);
        new.last_verified = 2_000;

        let merged = merge_accounts(old, new);
        assert_eq!(merged.confidence, 90);
        assert_eq!(merged.last_verified, 2_000);
    }

    #[tokio::test]
    async fn test_profile_source_roundtrip() {
        let profiles = MemoryProfileSource::new();
        profiles.insert(
            "alice",
            UserProfile {
                primary_email: Some("alice@example.com".into()),
                ..Default::default()
            },
        );

        let loaded = profiles.load_profile("alice").await.unwrap().unwrap();
        assert_eq!(loaded.primary_email.unwrap(), "alice@example.com");
        assert!(profiles.load_profile("bob").await.unwrap().is_none());
    }
}
