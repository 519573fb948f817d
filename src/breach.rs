//! Breach-data correlation collaborator.
//!
//! An optional enrichment step: a [`BreachProvider`] attaches known breach
//! records to probed identifiers. The enrichment is strictly additive —
//! it never alters discovery confidence, and severity scoring happens
//! outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One known breach involving an identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachRecord {
    /// Name of the breached service or dataset
    pub source: String,
    /// When the breach occurred (Unix timestamp), if known
    pub breached_at: Option<i64>,
    /// Kinds of data exposed ("passwords", "emails", ...)
    #[serde(default)]
    pub data_classes: Vec<String>,
}

/// External breach-data lookup contract
#[async_trait]
pub trait BreachProvider: Send + Sync {
    /// Known breaches involving the given identifier value
    async fn breaches_for_identifier(&self, value: &str) -> Result<Vec<BreachRecord>>;
}

/// Provider that knows of no breaches; the default when breach lookup
/// is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBreachProvider;

#[async_trait]
impl BreachProvider for NullBreachProvider {
    async fn breaches_for_identifier(&self, _value: &str) -> Result<Vec<BreachRecord>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_provider_returns_nothing() {
        let provider = NullBreachProvider;
        let records = provider
            .breaches_for_identifier("jdoe@example.com")
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_breach_record_serde() {
        let record = BreachRecord {
            source: "example-breach-2021".into(),
            breached_at: Some(1_612_137_600),
            data_classes: vec!["emails".into(), "passwords".into()],
        };
        let json = serde_json::to_string(&record).unwrap();
        let restored: BreachRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, restored);
    }
}
