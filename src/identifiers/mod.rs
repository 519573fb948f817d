//! # Identifier Preparer
//!
//! Pure transform turning a requester's profile into the weighted,
//! deduplicated list of identifiers to probe against platforms.
//!
//! ## Provenance Weights
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       IDENTIFIER PROVENANCE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Source                    Weight    Meaning                            │
//! │  ────────────────────────────────────────────────────────────           │
//! │  Primary email               100     Strongest ownership signal         │
//! │  Alternate email              90     Declared by the requester          │
//! │  Phone                        85     Declared by the requester          │
//! │  Explicit username            75     Declared by the requester          │
//! │  Email-derived variation      60     Guessed from the email local-part  │
//! │  Name-derived variation       50     Guessed from the full name         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Variation Rules
//!
//! All variation rules are deterministic, emit nothing shorter than
//! [`MIN_VARIATION_LEN`] characters, and are deduplicated against every
//! identifier produced before them (case-insensitive):
//!
//! - email local-part with digits stripped
//! - email local-part with separators (`.`, `_`, `-`) stripped
//! - email local-part with common numeric suffixes appended
//! - first+last name joined with common separators
//! - first-initial+last and first+last-initial combinations
//!
//! This module is a pure function of the profile — no I/O, no clock.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimum length for a generated username variation
pub const MIN_VARIATION_LEN: usize = 3;

/// Numeric suffixes appended to the email local-part when generating
/// username variations
const VARIATION_SUFFIXES: [&str; 3] = ["1", "2", "123"];

/// Separators tried when combining first and last name
const NAME_SEPARATORS: [&str; 4] = ["", ".", "_", "-"];

/// The kind of value an identifier holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// An email address
    Email,
    /// A platform username/handle
    Username,
    /// A phone number
    Phone,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Email => write!(f, "email"),
            IdentifierKind::Username => write!(f, "username"),
            IdentifierKind::Phone => write!(f, "phone"),
        }
    }
}

/// Where an identifier came from; determines its confidence weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierSource {
    /// The requester's primary email address
    PrimaryEmail,
    /// An alternate email declared by the requester
    AlternateEmail,
    /// A phone number declared by the requester
    Phone,
    /// A username explicitly declared by the requester
    ExplicitUsername,
    /// A username derived from an email local-part
    EmailVariation,
    /// A username derived from the requester's full name
    NameVariation,
}

impl IdentifierSource {
    /// Deterministic provenance weight (0-100)
    pub fn confidence_weight(&self) -> u8 {
        match self {
            IdentifierSource::PrimaryEmail => 100,
            IdentifierSource::AlternateEmail => 90,
            IdentifierSource::Phone => 85,
            IdentifierSource::ExplicitUsername => 75,
            IdentifierSource::EmailVariation => 60,
            IdentifierSource::NameVariation => 50,
        }
    }
}

/// A single value to probe against platforms
///
/// Immutable once built; a fresh list is prepared for every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// What kind of value this is
    pub kind: IdentifierKind,
    /// The value itself, as probed
    pub value: String,
    /// Provenance of the value
    pub source: IdentifierSource,
}

impl Identifier {
    /// Provenance confidence weight (0-100)
    pub fn weight(&self) -> u8 {
        self.source.confidence_weight()
    }

    /// Canonical form used for deduplication and account grouping
    pub fn canonical_value(&self) -> String {
        self.value.trim().to_lowercase()
    }
}

/// Profile fields consumed by the preparer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    /// Primary email address
    pub primary_email: Option<String>,
    /// Additional email addresses
    pub alternate_emails: Vec<String>,
    /// Phone numbers
    pub phones: Vec<String>,
    /// Known usernames/handles
    pub usernames: Vec<String>,
    /// Full name ("First Last")
    pub full_name: Option<String>,
}

impl UserProfile {
    /// True when the profile contains nothing that could be probed
    pub fn is_empty(&self) -> bool {
        self.primary_email.is_none()
            && self.alternate_emails.is_empty()
            && self.phones.is_empty()
            && self.usernames.is_empty()
            && self.full_name.is_none()
    }
}

/// Build the deduplicated, weighted identifier list for a profile.
///
/// Output order is deterministic: declared identifiers first (primary
/// email, alternates, phones, usernames), then email-derived variations,
/// then name-derived variations. Duplicates (case-insensitive, per kind)
/// keep their first occurrence, so a variation can never shadow a
/// declared identifier.
pub fn prepare_identifiers(profile: &UserProfile) -> Vec<Identifier> {
    let mut out: Vec<Identifier> = Vec::new();
    let mut seen: HashSet<(IdentifierKind, String)> = HashSet::new();

    let mut push = |out: &mut Vec<Identifier>,
                    seen: &mut HashSet<(IdentifierKind, String)>,
                    kind: IdentifierKind,
                    value: &str,
                    source: IdentifierSource| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        let key = (kind, trimmed.to_lowercase());
        if seen.insert(key) {
            out.push(Identifier {
                kind,
                value: trimmed.to_string(),
                source,
            });
        }
    };

    if let Some(email) = &profile.primary_email {
        push(
            &mut out,
            &mut seen,
            IdentifierKind::Email,
            email,
            IdentifierSource::PrimaryEmail,
        );
    }
    for email in &profile.alternate_emails {
        push(
            &mut out,
            &mut seen,
            IdentifierKind::Email,
            email,
            IdentifierSource::AlternateEmail,
        );
    }
    for phone in &profile.phones {
        let normalized = normalize_phone(phone);
        push(
            &mut out,
            &mut seen,
            IdentifierKind::Phone,
            &normalized,
            IdentifierSource::Phone,
        );
    }
    for username in &profile.usernames {
        push(
            &mut out,
            &mut seen,
            IdentifierKind::Username,
            username,
            IdentifierSource::ExplicitUsername,
        );
    }

    // Email-derived username variations, from every declared email
    let mut emails: Vec<&String> = Vec::new();
    if let Some(email) = &profile.primary_email {
        emails.push(email);
    }
    emails.extend(profile.alternate_emails.iter());
    for email in emails {
        for variation in email_variations(email) {
            push(
                &mut out,
                &mut seen,
                IdentifierKind::Username,
                &variation,
                IdentifierSource::EmailVariation,
            );
        }
    }

    // Name-derived username variations
    if let Some(name) = &profile.full_name {
        for variation in name_variations(name) {
            push(
                &mut out,
                &mut seen,
                IdentifierKind::Username,
                &variation,
                IdentifierSource::NameVariation,
            );
        }
    }

    out
}

/// Username variations derived from an email address's local-part.
///
/// Deterministic and self-deduplicating; every candidate shorter than
/// [`MIN_VARIATION_LEN`] is dropped.
pub fn email_variations(email: &str) -> Vec<String> {
    let local = match email.split('@').next() {
        Some(local) if !local.is_empty() => local.trim().to_lowercase(),
        _ => return Vec::new(),
    };

    let mut candidates: Vec<String> = Vec::new();

    // The local-part itself is a common username
    candidates.push(local.clone());

    // Strip digits: "jdoe1990" -> "jdoe"
    let no_digits: String = local.chars().filter(|c| !c.is_ascii_digit()).collect();
    candidates.push(no_digits);

    // Strip separators: "j.doe" -> "jdoe"
    let no_separators: String = local
        .chars()
        .filter(|c| !matches!(c, '.' | '_' | '-'))
        .collect();
    candidates.push(no_separators);

    // Numeric suffixes on the local-part
    for suffix in VARIATION_SUFFIXES {
        candidates.push(format!("{}{}", local, suffix));
    }

    dedup_variations(candidates)
}

/// Username variations derived from a full name.
///
/// Uses the first and last whitespace-separated words; middle names are
/// ignored. Single-word names only yield the word itself.
pub fn name_variations(full_name: &str) -> Vec<String> {
    let words: Vec<String> = full_name
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let (first, last) = match (words.first(), words.last()) {
        (Some(first), Some(last)) if words.len() >= 2 => (first.clone(), last.clone()),
        (Some(first), _) => return dedup_variations(vec![first.clone()]),
        _ => return Vec::new(),
    };

    let mut candidates: Vec<String> = Vec::new();

    // "first.last", "first_last", "first-last", "firstlast"
    for sep in NAME_SEPARATORS {
        candidates.push(format!("{}{}{}", first, sep, last));
    }

    // Initials combinations: "jdoe", "johnd"
    if let Some(fi) = first.chars().next() {
        candidates.push(format!("{}{}", fi, last));
    }
    if let Some(li) = last.chars().next() {
        candidates.push(format!("{}{}", first, li));
    }

    dedup_variations(candidates)
}

/// Normalize a phone number to digits plus an optional leading `+`.
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    out
}

/// Apply the length floor and order-preserving dedup shared by all
/// variation generators.
fn dedup_variations(candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| c.len() >= MIN_VARIATION_LEN)
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
