// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Knowledge
//!
//! Versioned, content-addressed knowledge entries keyed by `(Topic, Slug)`.
//!
//! Each write produces an immutable commit identified by a [`CommitId`]
//! derived from the update time, author and content. The slug itself only
//! carries a [`KnowledgeState`]; the readable value of a slug is the latest
//! commit when the slug is `Active`, and nothing when it is `Archived`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Knowledge commits, slug lifecycle and commit addressing

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::clock::Clock;
use crate::domain::validation::{self, ValidationError};

/// Longest accepted human-readable knowledge name.
pub const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(pub String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_storage_key("topic", &self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(pub String);

impl Slug {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_storage_key("slug", &self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content address of one knowledge commit (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a slug. Commits are never deleted; archiving only hides the
/// slug from active reads until the next `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeState {
    #[default]
    Active,
    Archived,
}

impl KnowledgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeState::Active => "active",
            KnowledgeState::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "active" => Ok(KnowledgeState::Active),
            "archived" => Ok(KnowledgeState::Archived),
            other => Err(ValidationError::Invalid(format!(
                "unknown knowledge state '{}'",
                other
            ))),
        }
    }
}

/// Derives the commit address from `(updated_at, author, content)`.
///
/// The timestamp is rendered with nanosecond precision, so two writes that
/// differ only in update time still produce distinct commits.
pub fn generate_commit_id(updated_at: DateTime<Utc>, author: &str, content: &str) -> CommitId {
    let mut hasher = Sha256::new();
    hasher.update(updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    hasher.update([0u8]);
    hasher.update(author.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    CommitId(hex::encode(hasher.finalize()))
}

/// One immutable commit of a knowledge entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    pub topic: Topic,
    pub slug: Slug,
    pub commit_id: CommitId,
    pub name: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub state: KnowledgeState,
}

impl Knowledge {
    /// First commit of a slug.
    pub fn new(
        topic: Topic,
        slug: Slug,
        name: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        let content = content.into();
        let author = author.into();
        Self {
            commit_id: generate_commit_id(now, &author, &content),
            topic,
            slug,
            name: name.into(),
            content,
            author,
            created_at: now,
            updated_at: now,
            state: KnowledgeState::Active,
        }
    }

    /// Next commit for the same slug, keeping `created_at`.
    pub fn revise(
        &self,
        name: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        let content = content.into();
        let author = author.into();
        Self {
            topic: self.topic.clone(),
            slug: self.slug.clone(),
            commit_id: generate_commit_id(now, &author, &content),
            name: name.into(),
            content,
            author,
            created_at: self.created_at,
            updated_at: now,
            state: KnowledgeState::Active,
        }
    }

    /// The address this commit must be stored under.
    pub fn expected_commit_id(&self) -> CommitId {
        generate_commit_id(self.updated_at, &self.author, &self.content)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.topic.validate()?;
        self.slug.validate()?;
        validation::require_non_empty("name", &self.name)?;
        validation::require_max_chars("name", &self.name, MAX_NAME_CHARS)?;
        validation::require_non_empty("content", &self.content)?;
        validation::require_non_empty("author", &self.author)?;
        validation::require_nanos_timestamp("created_at", self.created_at)?;
        validation::require_nanos_timestamp("updated_at", self.updated_at)?;

        if !self.commit_id.is_empty() && self.commit_id != self.expected_commit_id() {
            return Err(ValidationError::Invalid(format!(
                "commit_id {} does not match the commit content",
                self.commit_id
            )));
        }
        Ok(())
    }

    /// Copy normalised for storage: state forced active and, when the caller
    /// left it empty, the commit id derived. Timestamps are kept as given.
    pub fn to_commit(&self) -> Result<Knowledge, ValidationError> {
        self.validate()?;
        let mut commit = self.clone();
        if commit.commit_id.is_empty() {
            commit.commit_id = commit.expected_commit_id();
        }
        commit.state = KnowledgeState::Active;
        Ok(commit)
    }
}

/// `(slug, name)` pair returned by slug listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugSummary {
    pub slug: Slug,
    pub name: String,
}

/// A topic together with the number of its active slugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic: Topic,
    pub active_slugs: usize,
}

/// Picks the current commit: latest `updated_at`, ties broken by the larger
/// commit id so the winner is stable for a given set of commits.
pub fn latest_commit<'a, I>(commits: I) -> Option<&'a Knowledge>
where
    I: IntoIterator<Item = &'a Knowledge>,
{
    commits.into_iter().max_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then_with(|| a.commit_id.cmp(&b.commit_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::FixedClock;
    use chrono::Duration;

    fn clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap())
    }

    #[test]
    fn test_commit_id_is_deterministic() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let a = generate_commit_id(at, "alice", "runbook");
        let b = generate_commit_id(at, "alice", "runbook");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_commit_id_changes_with_each_input() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let base = generate_commit_id(at, "alice", "runbook");

        assert_ne!(base, generate_commit_id(at + Duration::nanoseconds(1), "alice", "runbook"));
        assert_ne!(base, generate_commit_id(at, "bob", "runbook"));
        assert_ne!(base, generate_commit_id(at, "alice", "runbook v2"));
    }

    #[test]
    fn test_commit_id_field_boundaries_are_unambiguous() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_ne!(
            generate_commit_id(at, "ab", "c"),
            generate_commit_id(at, "a", "bc")
        );
    }

    #[test]
    fn test_new_keeps_nanosecond_timestamps() {
        let clock = clock();
        let k = Knowledge::new(
            Topic::new("ops"),
            Slug::new("restart"),
            "Restart",
            "kubectl rollout restart",
            "alice",
            &clock,
        );
        assert_eq!(k.updated_at.timestamp_subsec_nanos(), 123_456_789);
        assert_eq!(k.commit_id, k.expected_commit_id());
        assert!(k.validate().is_ok());
    }

    #[test]
    fn test_to_commit_accepts_caller_built_commit() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let k = Knowledge {
            topic: Topic::new("ops"),
            slug: Slug::new("restart"),
            commit_id: generate_commit_id(at, "alice", "body"),
            name: "Restart".into(),
            content: "body".into(),
            author: "alice".into(),
            created_at: at,
            updated_at: at,
            state: KnowledgeState::Archived,
        };
        assert!(k.validate().is_ok());

        let commit = k.to_commit().unwrap();
        assert_eq!(commit.commit_id, k.commit_id);
        assert_eq!(commit.updated_at, at);
        assert_eq!(commit.state, KnowledgeState::Active);

        let mut unaddressed = k.clone();
        unaddressed.commit_id = CommitId::default();
        let commit = unaddressed.to_commit().unwrap();
        assert_eq!(commit.commit_id, generate_commit_id(at, "alice", "body"));
    }

    #[test]
    fn test_timestamps_outside_nanosecond_range_are_rejected() {
        let clock = clock();
        let mut k = Knowledge::new(Topic::new("ops"), Slug::new("s"), "n", "body", "alice", &clock);
        k.updated_at = DateTime::from_timestamp(32_503_680_000, 0).unwrap(); // year 3000
        k.commit_id = k.expected_commit_id();
        assert!(matches!(k.validate(), Err(ValidationError::Invalid(_))));
        assert!(k.to_commit().is_err());
    }

    #[test]
    fn test_revise_keeps_created_at() {
        let clock = clock();
        let first = Knowledge::new(Topic::new("ops"), Slug::new("restart"), "Restart", "v1", "alice", &clock);
        clock.advance(Duration::seconds(10));
        let second = first.revise("Restart", "v2", "bob", &clock);

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_ne!(second.commit_id, first.commit_id);
    }

    #[test]
    fn test_validation_rules() {
        let clock = clock();
        let valid = Knowledge::new(Topic::new("ops"), Slug::new("restart"), "Restart", "body", "alice", &clock);

        let mut k = valid.clone();
        k.name = "x".repeat(MAX_NAME_CHARS + 1);
        assert!(matches!(k.validate(), Err(ValidationError::TooLong { field: "name", .. })));

        let mut k = valid.clone();
        k.author = String::new();
        assert!(matches!(k.validate(), Err(ValidationError::MissingField { field: "author" })));

        let mut k = valid.clone();
        k.slug = Slug::new("a/b");
        assert!(matches!(k.validate(), Err(ValidationError::InvalidKey { field: "slug", .. })));

        let mut k = valid.clone();
        k.content = "tampered".into();
        assert!(k.validate().is_err());

        let mut k = valid;
        k.commit_id = CommitId::default();
        let commit = k.to_commit().unwrap();
        assert_eq!(commit.commit_id, commit.expected_commit_id());
    }

    #[test]
    fn test_latest_commit_tie_break_is_stable() {
        let clock = clock();
        let a = Knowledge::new(Topic::new("t"), Slug::new("s"), "n", "one", "alice", &clock);
        let b = Knowledge::new(Topic::new("t"), Slug::new("s"), "n", "two", "alice", &clock);
        assert_eq!(a.updated_at, b.updated_at);

        let forward = latest_commit([&a, &b]).unwrap().commit_id.clone();
        let backward = latest_commit([&b, &a]).unwrap().commit_id.clone();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(KnowledgeState::parse("active").unwrap(), KnowledgeState::Active);
        assert_eq!(KnowledgeState::parse("archived").unwrap(), KnowledgeState::Archived);
        assert!(KnowledgeState::parse("deleted").is_err());
    }
}
