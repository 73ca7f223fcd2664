// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent memory: scored `query -> outcome` records an agent retrieves as
//! few-shot examples. Records are scoped to their owning agent and are
//! mutable in place (score updates) or hard-deleted.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::clock::Clock;
use crate::domain::embedding::Embedding;
use crate::domain::validation::{self, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentMemoryId(pub String);

impl AgentMemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentMemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentMemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    pub id: AgentMemoryId,
    pub agent_id: AgentId,
    /// Task the agent was asked to perform.
    pub task_query: String,
    /// Embedding of `task_query`, used for nearest-neighbour retrieval.
    pub query_embedding: Embedding,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub successes: Vec<String>,
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Curation score; positive when the memory helped, negative when it misled.
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AgentMemory {
    pub fn new(
        agent_id: AgentId,
        task_query: impl Into<String>,
        query_embedding: impl Into<Embedding>,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            id: AgentMemoryId::new(),
            agent_id,
            task_query: task_query.into(),
            query_embedding: query_embedding.into(),
            timestamp: clock.now().trunc_subsecs(6),
            successes: Vec::new(),
            problems: Vec::new(),
            improvements: Vec::new(),
            quality_score: 0.0,
            last_used_at: None,
        }
    }

    pub fn with_id(mut self, id: AgentMemoryId) -> Self {
        self.id = id;
        self
    }

    pub fn with_outcome(
        mut self,
        successes: Vec<String>,
        problems: Vec<String>,
        improvements: Vec<String>,
    ) -> Self {
        self.successes = successes;
        self.problems = problems;
        self.improvements = improvements;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_non_empty("id", self.id.as_str())?;
        validation::require_non_empty("agent_id", self.agent_id.as_str())?;
        validation::require_non_empty("task_query", &self.task_query)?;
        validation::require_embedding(self.query_embedding.as_slice())?;
        if !self.quality_score.is_finite() {
            return Err(ValidationError::Invalid(format!(
                "quality_score must be finite (got {})",
                self.quality_score
            )));
        }
        Ok(())
    }

    /// Copy with timestamps at the microsecond precision every backend stores.
    pub(crate) fn normalized(&self) -> AgentMemory {
        let mut memory = self.clone();
        memory.timestamp = self.timestamp.trunc_subsecs(6);
        memory.last_used_at = self.last_used_at.map(|at| at.trunc_subsecs(6));
        memory
    }

    pub(crate) fn apply_score(&mut self, update: &ScoreUpdate) {
        self.quality_score = update.score;
        self.last_used_at = Some(update.last_used_at.trunc_subsecs(6));
    }
}

/// New values for the two curation fields of one memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub score: f64,
    pub last_used_at: DateTime<Utc>,
}

/// A search hit with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: AgentMemory,
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::FixedClock;

    fn clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_700_000_000, 987_654_321).unwrap())
    }

    #[test]
    fn test_new_defaults() {
        let memory = AgentMemory::new(AgentId::new("triage"), "summarise alert", vec![0.1, 0.2], &clock());
        assert_eq!(memory.quality_score, 0.0);
        assert!(memory.last_used_at.is_none());
        assert!(!memory.id.as_str().is_empty());
        assert_eq!(memory.timestamp.timestamp_subsec_nanos(), 987_654_000);
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_degenerate_embedding() {
        let clock = clock();
        let empty = AgentMemory::new(AgentId::new("a"), "q", Vec::<f32>::new(), &clock);
        assert_eq!(
            empty.validate(),
            Err(ValidationError::InvalidEmbedding { length: 0 })
        );

        let zero = AgentMemory::new(AgentId::new("a"), "q", vec![0.0; 4], &clock);
        assert_eq!(
            zero.validate(),
            Err(ValidationError::InvalidEmbedding { length: 4 })
        );
    }

    #[test]
    fn test_validate_requires_owner_and_query() {
        let clock = clock();
        let memory = AgentMemory::new(AgentId::new(""), "q", vec![1.0], &clock);
        assert!(matches!(memory.validate(), Err(ValidationError::MissingField { field: "agent_id" })));

        let memory = AgentMemory::new(AgentId::new("a"), "", vec![1.0], &clock);
        assert!(matches!(memory.validate(), Err(ValidationError::MissingField { field: "task_query" })));

        let mut memory = AgentMemory::new(AgentId::new("a"), "q", vec![1.0], &clock);
        memory.quality_score = f64::NAN;
        assert!(memory.validate().is_err());
    }

    #[test]
    fn test_apply_score_touches_only_curation_fields() {
        let clock = clock();
        let original = AgentMemory::new(AgentId::new("a"), "q", vec![1.0], &clock)
            .with_outcome(vec!["found root cause".into()], vec![], vec![]);
        let mut updated = original.clone();
        let at = clock.now();
        updated.apply_score(&ScoreUpdate { score: 2.5, last_used_at: at });

        assert_eq!(updated.quality_score, 2.5);
        assert_eq!(updated.last_used_at, Some(at.trunc_subsecs(6)));
        assert_eq!(updated.task_query, original.task_query);
        assert_eq!(updated.successes, original.successes);
        assert_eq!(updated.timestamp, original.timestamp);
    }
}
