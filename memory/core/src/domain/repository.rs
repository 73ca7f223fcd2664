// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the memory store, following the DDD Repository
//! pattern: one repository per aggregate, interface defined in the domain layer,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AgentMemoryRepository` | `AgentMemory` | `InMemoryAgentMemoryRepository`, `PostgresAgentMemoryRepository` |
//! | `KnowledgeRepository` | `Knowledge` (slug + commits) | `InMemoryKnowledgeRepository`, `PostgresKnowledgeRepository` |
//! | `MemoryHistoryRepository<S>` | `ExecutionMemory`, `TicketMemory` | `InMemoryHistoryRepository<S>`, `PostgresHistoryRepository<S>` |
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup from the store
//! configuration (`aegis-memory.yaml`). Both implementations of a trait
//! must return the same result sets for the same stored data: in-memory
//! search ranks with [`crate::domain::embedding::similarity`], PostgreSQL
//! ranks with pgvector's cosine distance.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::domain::agent_memory::{AgentId, AgentMemory, AgentMemoryId, ScoreUpdate, ScoredMemory};
use crate::domain::history::{ExecutionMemory, HistorySnapshot, SchemaId, TicketMemory};
use crate::domain::knowledge::{CommitId, Knowledge, Slug, SlugSummary, Topic, TopicSummary};
use crate::domain::query::MemoryPredicate;
use crate::domain::validation::ValidationError;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

/// Repository interface for agent memories.
///
/// Every method is scoped by `AgentId`; a record saved under one agent is
/// invisible to every other agent.
#[async_trait]
pub trait AgentMemoryRepository: Send + Sync {
    /// Validate then create-or-replace by id.
    async fn save(&self, memory: &AgentMemory) -> Result<(), RepositoryError>;

    /// Fetch one memory. Absent and owned-by-another-agent are both `NotFound`.
    async fn get(&self, agent_id: &AgentId, id: &AgentMemoryId) -> Result<AgentMemory, RepositoryError>;

    /// Nearest neighbours of `query` among this agent's memories, most
    /// similar first. `limit == 0` means no limit.
    async fn search(
        &self,
        agent_id: &AgentId,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, RepositoryError>;

    /// Overwrite `quality_score` and `last_used_at` of the listed memories.
    /// Unknown ids are ignored. Returns how many records were updated.
    async fn update_score_batch(
        &self,
        agent_id: &AgentId,
        updates: &HashMap<AgentMemoryId, ScoreUpdate>,
        cancel: &CancellationToken,
    ) -> Result<usize, RepositoryError>;

    /// Hard-delete the listed memories. Missing ids are skipped. Returns how
    /// many of the requested ids existed.
    async fn delete_batch(
        &self,
        agent_id: &AgentId,
        ids: &[AgentMemoryId],
        cancel: &CancellationToken,
    ) -> Result<usize, RepositoryError>;

    /// All memories of an agent, newest `timestamp` first.
    async fn list(&self, agent_id: &AgentId) -> Result<Vec<AgentMemory>, RepositoryError>;

    /// Memory count per agent across the whole store.
    async fn list_agent_ids(&self) -> Result<HashMap<AgentId, usize>, RepositoryError>;

    /// Memories of an agent matching every predicate, newest first.
    async fn find_matching(
        &self,
        agent_id: &AgentId,
        predicates: &[MemoryPredicate],
    ) -> Result<Vec<AgentMemory>, RepositoryError>;
}

/// Repository interface for versioned knowledge.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Store a commit under `(topic, slug)` and mark the slug active.
    /// Both parts land together or not at all.
    async fn put(&self, knowledge: &Knowledge) -> Result<CommitId, RepositoryError>;

    /// Latest commit of an active slug; `None` if absent or archived.
    async fn get(&self, topic: &Topic, slug: &Slug) -> Result<Option<Knowledge>, RepositoryError>;

    /// Exact commit lookup, regardless of the slug state.
    async fn get_by_commit(
        &self,
        topic: &Topic,
        slug: &Slug,
        commit_id: &CommitId,
    ) -> Result<Option<Knowledge>, RepositoryError>;

    /// Latest commit of every active slug in a topic, ordered by slug.
    async fn list(&self, topic: &Topic) -> Result<Vec<Knowledge>, RepositoryError>;

    async fn list_slugs(&self, topic: &Topic) -> Result<Vec<SlugSummary>, RepositoryError>;

    /// Topics with at least one active slug, ordered by topic.
    async fn list_topics(&self) -> Result<Vec<TopicSummary>, RepositoryError>;

    /// Mark a slug archived. Unknown slugs are a no-op.
    async fn archive(&self, topic: &Topic, slug: &Slug) -> Result<(), RepositoryError>;

    /// Total content length in bytes over the latest commits of active slugs.
    async fn size(&self, topic: &Topic) -> Result<usize, RepositoryError>;
}

/// Repository interface for append-only schema histories.
#[async_trait]
pub trait MemoryHistoryRepository<S: HistorySnapshot>: Send + Sync {
    /// Append a snapshot to the history of `snapshot.schema_id()`.
    async fn put(&self, snapshot: &S) -> Result<(), RepositoryError>;

    /// Most recently appended snapshot.
    async fn get_latest(&self, schema_id: &SchemaId) -> Result<Option<S>, RepositoryError>;

    /// Snapshots ranked by similarity to `embedding`. Snapshots without an
    /// embedding are skipped; an empty query returns nothing without scanning.
    async fn search_by_embedding(
        &self,
        schema_id: &SchemaId,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<S>, RepositoryError>;

    /// Whole history in insertion order.
    async fn list_history(&self, schema_id: &SchemaId) -> Result<Vec<S>, RepositoryError>;
}

pub type ExecutionMemoryRepository = dyn MemoryHistoryRepository<ExecutionMemory>;
pub type TicketMemoryRepository = dyn MemoryHistoryRepository<TicketMemory>;

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error ({context}): {message}")]
    Database { context: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled before any write was applied")]
    Cancelled,

    #[error("Batch partially applied: {} completed, {} cancelled", .completed.len(), .cancelled.len())]
    PartialBatch {
        completed: Vec<String>,
        cancelled: Vec<String>,
    },
}

impl RepositoryError {
    pub fn database(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RepositoryError::Database {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RepositoryError::Validation(_))
    }

    pub fn is_invalid_embedding(&self) -> bool {
        matches!(
            self,
            RepositoryError::Validation(ValidationError::InvalidEmbedding { .. })
        )
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            // Rows that reached us but do not decode are bad data, not a backend failure
            err @ (sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }) => {
                RepositoryError::Serialization(err.to_string())
            }
            other => RepositoryError::database("sqlx", other),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
