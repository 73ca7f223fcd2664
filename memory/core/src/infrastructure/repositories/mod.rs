// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! This module provides infrastructure implementations of the repository
//! abstractions defined in `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve memories, knowledge and histories
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! Production implementations backed by PostgreSQL with the pgvector extension:
//! - **PostgresAgentMemoryRepository** - per-agent memories, native cosine search
//! - **PostgresKnowledgeRepository** - slug state + immutable commit log
//! - **PostgresHistoryRepository** - append-only execution/ticket histories
//!
//! ## In-Memory Repositories
//!
//! Process-lifetime implementations for tests and local runs. Each instance
//! owns its maps behind a single reader/writer lock; search is a full scan
//! ranked by `domain::embedding::similarity`. Locks are never held across an
//! `.await`, so dropping an operation's future cannot leave a partial write.
//! Every read hands out clones, never references into the maps.
//!
//! # Usage
//!
//! ```no_run
//! use aegis_memory_core::infrastructure::repositories::InMemoryAgentMemoryRepository;
//! use aegis_memory_core::domain::repository::AgentMemoryRepository;
//!
//! let repo = InMemoryAgentMemoryRepository::new();
//! ```

pub mod postgres_agent_memory;
pub mod postgres_history;
pub mod postgres_knowledge;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::agent_memory::{AgentId, AgentMemory, AgentMemoryId, ScoreUpdate, ScoredMemory};
use crate::domain::embedding::{self, Embedding};
use crate::domain::history::{ExecutionMemory, HistorySnapshot, SchemaId, TicketMemory};
use crate::domain::knowledge::{
    latest_commit, CommitId, Knowledge, KnowledgeState, Slug, SlugSummary, Topic, TopicSummary,
};
use crate::domain::query::{matches_all, MemoryPredicate};
use crate::domain::repository::{
    AgentMemoryRepository, KnowledgeRepository, MemoryHistoryRepository, RepositoryError,
};

pub use postgres_agent_memory::PostgresAgentMemoryRepository;
pub use postgres_history::{
    PostgresExecutionMemoryRepository, PostgresHistoryRepository, PostgresTicketMemoryRepository,
};
pub use postgres_knowledge::PostgresKnowledgeRepository;

/// True when a stored vector can take part in a ranking against `query`.
/// Legacy invalid vectors are skipped and counted, not surfaced as errors.
pub(crate) fn rankable(entity: &'static str, stored: &Embedding, query: &[f32]) -> bool {
    if stored.is_invalid() {
        metrics::counter!("aegis_memory_skipped_embeddings_total", "entity" => entity).increment(1);
        warn!(entity, length = stored.len(), "Skipping record with invalid embedding during search");
        return false;
    }
    stored.len() == query.len()
}

// ============================================================================
// Agent memory
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryAgentMemoryRepository {
    memories: Arc<RwLock<HashMap<AgentId, HashMap<AgentMemoryId, AgentMemory>>>>,
}

impl InMemoryAgentMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(memories: &mut [AgentMemory]) {
    memories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl AgentMemoryRepository for InMemoryAgentMemoryRepository {
    async fn save(&self, memory: &AgentMemory) -> Result<(), RepositoryError> {
        memory.validate()?;

        let mut memories = self.memories.write();
        memories
            .entry(memory.agent_id.clone())
            .or_default()
            .insert(memory.id.clone(), memory.normalized());

        debug!(agent_id = %memory.agent_id, memory_id = %memory.id, "Saved agent memory");
        Ok(())
    }

    async fn get(&self, agent_id: &AgentId, id: &AgentMemoryId) -> Result<AgentMemory, RepositoryError> {
        let memories = self.memories.read();
        memories
            .get(agent_id)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("agent memory {} for agent {}", id, agent_id)))
    }

    async fn search(
        &self,
        agent_id: &AgentId,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, RepositoryError> {
        if embedding::is_invalid(query) {
            debug!(agent_id = %agent_id, "Search with empty or zero query embedding returns nothing");
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredMemory> = {
            let memories = self.memories.read();
            match memories.get(agent_id) {
                Some(records) => records
                    .values()
                    .filter(|m| rankable("agent_memory", &m.query_embedding, query))
                    .map(|m| ScoredMemory {
                        similarity: embedding::similarity(query, m.query_embedding.as_slice()),
                        memory: m.clone(),
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        if limit > 0 {
            scored.truncate(limit);
        }

        debug!(agent_id = %agent_id, limit, hits = scored.len(), "Searched agent memories");
        Ok(scored)
    }

    async fn update_score_batch(
        &self,
        agent_id: &AgentId,
        updates: &HashMap<AgentMemoryId, ScoreUpdate>,
        cancel: &CancellationToken,
    ) -> Result<usize, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let mut updated = 0;
        {
            let mut memories = self.memories.write();
            if let Some(records) = memories.get_mut(agent_id) {
                for (id, update) in updates {
                    if let Some(memory) = records.get_mut(id) {
                        memory.apply_score(update);
                        updated += 1;
                    }
                }
            }
        }

        metrics::counter!("aegis_memory_batch_items_total", "op" => "update_score", "outcome" => "applied")
            .increment(updated as u64);
        debug!(agent_id = %agent_id, requested = updates.len(), updated, "Updated agent memory scores");
        Ok(updated)
    }

    async fn delete_batch(
        &self,
        agent_id: &AgentId,
        ids: &[AgentMemoryId],
        cancel: &CancellationToken,
    ) -> Result<usize, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let mut deleted = 0;
        {
            let mut memories = self.memories.write();
            if let Some(records) = memories.get_mut(agent_id) {
                for id in ids {
                    if records.remove(id).is_some() {
                        deleted += 1;
                    }
                }
                if records.is_empty() {
                    memories.remove(agent_id);
                }
            }
        }

        metrics::counter!("aegis_memory_batch_items_total", "op" => "delete", "outcome" => "applied")
            .increment(deleted as u64);
        debug!(agent_id = %agent_id, requested = ids.len(), deleted, "Deleted agent memories");
        Ok(deleted)
    }

    async fn list(&self, agent_id: &AgentId) -> Result<Vec<AgentMemory>, RepositoryError> {
        let mut list: Vec<AgentMemory> = {
            let memories = self.memories.read();
            memories
                .get(agent_id)
                .map(|records| records.values().cloned().collect())
                .unwrap_or_default()
        };
        newest_first(&mut list);
        Ok(list)
    }

    async fn list_agent_ids(&self) -> Result<HashMap<AgentId, usize>, RepositoryError> {
        let memories = self.memories.read();
        Ok(memories
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(agent_id, records)| (agent_id.clone(), records.len()))
            .collect())
    }

    async fn find_matching(
        &self,
        agent_id: &AgentId,
        predicates: &[MemoryPredicate],
    ) -> Result<Vec<AgentMemory>, RepositoryError> {
        for predicate in predicates {
            predicate.validate()?;
        }

        let mut list: Vec<AgentMemory> = {
            let memories = self.memories.read();
            memories
                .get(agent_id)
                .map(|records| {
                    records
                        .values()
                        .filter(|m| matches_all(predicates, m))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        newest_first(&mut list);
        Ok(list)
    }
}

// ============================================================================
// Knowledge
// ============================================================================

#[derive(Debug, Clone)]
struct SlugEntry {
    state: KnowledgeState,
    commits: HashMap<CommitId, Knowledge>,
}

impl SlugEntry {
    fn current(&self) -> Option<Knowledge> {
        if self.state != KnowledgeState::Active {
            return None;
        }
        latest_commit(self.commits.values()).cloned()
    }
}

#[derive(Clone, Default)]
pub struct InMemoryKnowledgeRepository {
    topics: Arc<RwLock<BTreeMap<Topic, BTreeMap<Slug, SlugEntry>>>>,
}

impl InMemoryKnowledgeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    async fn put(&self, knowledge: &Knowledge) -> Result<CommitId, RepositoryError> {
        let commit = knowledge.to_commit()?;
        let commit_id = commit.commit_id.clone();

        // Commit and state flip happen under one write guard
        let mut topics = self.topics.write();
        let entry = topics
            .entry(commit.topic.clone())
            .or_default()
            .entry(commit.slug.clone())
            .or_insert_with(|| SlugEntry {
                state: KnowledgeState::Active,
                commits: HashMap::new(),
            });
        entry.commits.entry(commit_id.clone()).or_insert(commit);
        entry.state = KnowledgeState::Active;

        debug!(topic = %knowledge.topic, slug = %knowledge.slug, commit_id = %commit_id, "Stored knowledge commit");
        Ok(commit_id)
    }

    async fn get(&self, topic: &Topic, slug: &Slug) -> Result<Option<Knowledge>, RepositoryError> {
        let topics = self.topics.read();
        Ok(topics
            .get(topic)
            .and_then(|slugs| slugs.get(slug))
            .and_then(SlugEntry::current))
    }

    async fn get_by_commit(
        &self,
        topic: &Topic,
        slug: &Slug,
        commit_id: &CommitId,
    ) -> Result<Option<Knowledge>, RepositoryError> {
        let topics = self.topics.read();
        Ok(topics
            .get(topic)
            .and_then(|slugs| slugs.get(slug))
            .and_then(|entry| {
                entry.commits.get(commit_id).map(|commit| {
                    let mut commit = commit.clone();
                    commit.state = entry.state;
                    commit
                })
            }))
    }

    async fn list(&self, topic: &Topic) -> Result<Vec<Knowledge>, RepositoryError> {
        let topics = self.topics.read();
        Ok(topics
            .get(topic)
            .map(|slugs| slugs.values().filter_map(SlugEntry::current).collect())
            .unwrap_or_default())
    }

    async fn list_slugs(&self, topic: &Topic) -> Result<Vec<SlugSummary>, RepositoryError> {
        Ok(self
            .list(topic)
            .await?
            .into_iter()
            .map(|k| SlugSummary {
                slug: k.slug,
                name: k.name,
            })
            .collect())
    }

    async fn list_topics(&self) -> Result<Vec<TopicSummary>, RepositoryError> {
        let topics = self.topics.read();
        Ok(topics
            .iter()
            .filter_map(|(topic, slugs)| {
                let active = slugs
                    .values()
                    .filter(|entry| entry.state == KnowledgeState::Active)
                    .count();
                (active > 0).then(|| TopicSummary {
                    topic: topic.clone(),
                    active_slugs: active,
                })
            })
            .collect())
    }

    async fn archive(&self, topic: &Topic, slug: &Slug) -> Result<(), RepositoryError> {
        let mut topics = self.topics.write();
        if let Some(entry) = topics.get_mut(topic).and_then(|slugs| slugs.get_mut(slug)) {
            entry.state = KnowledgeState::Archived;
            debug!(topic = %topic, slug = %slug, "Archived knowledge slug");
        }
        Ok(())
    }

    async fn size(&self, topic: &Topic) -> Result<usize, RepositoryError> {
        Ok(self.list(topic).await?.iter().map(|k| k.content.len()).sum())
    }
}

// ============================================================================
// Execution / ticket history
// ============================================================================

#[derive(Clone)]
pub struct InMemoryHistoryRepository<S: HistorySnapshot> {
    histories: Arc<RwLock<HashMap<SchemaId, Vec<S>>>>,
}

pub type InMemoryExecutionMemoryRepository = InMemoryHistoryRepository<ExecutionMemory>;
pub type InMemoryTicketMemoryRepository = InMemoryHistoryRepository<TicketMemory>;

impl<S: HistorySnapshot> InMemoryHistoryRepository<S> {
    pub fn new() -> Self {
        Self {
            histories: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<S: HistorySnapshot> Default for InMemoryHistoryRepository<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: HistorySnapshot> MemoryHistoryRepository<S> for InMemoryHistoryRepository<S> {
    async fn put(&self, snapshot: &S) -> Result<(), RepositoryError> {
        snapshot.validate()?;

        let mut histories = self.histories.write();
        let history = histories.entry(snapshot.schema_id().clone()).or_default();
        history.push(snapshot.clone());

        debug!(kind = S::KIND, schema_id = %snapshot.schema_id(), depth = history.len(), "Appended history snapshot");
        Ok(())
    }

    async fn get_latest(&self, schema_id: &SchemaId) -> Result<Option<S>, RepositoryError> {
        let histories = self.histories.read();
        Ok(histories.get(schema_id).and_then(|h| h.last()).cloned())
    }

    async fn search_by_embedding(
        &self,
        schema_id: &SchemaId,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<S>, RepositoryError> {
        if embedding::is_invalid(query) {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize, S)> = {
            let histories = self.histories.read();
            let Some(history) = histories.get(schema_id) else {
                return Ok(Vec::new());
            };
            history
                .iter()
                .enumerate()
                .filter_map(|(seq, snapshot)| {
                    let stored = snapshot.embedding()?;
                    rankable(S::KIND, stored, query)
                        .then(|| (embedding::similarity(query, stored.as_slice()), seq, snapshot.clone()))
                })
                .collect()
        };

        // Most similar first; among equals, the newer snapshot wins
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        if limit > 0 {
            scored.truncate(limit);
        }
        Ok(scored.into_iter().map(|(_, _, snapshot)| snapshot).collect())
    }

    async fn list_history(&self, schema_id: &SchemaId) -> Result<Vec<S>, RepositoryError> {
        let histories = self.histories.read();
        Ok(histories.get(schema_id).cloned().unwrap_or_default())
    }
}
