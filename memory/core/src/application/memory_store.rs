// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Store - Application Layer
//!
//! Bundles the four repositories behind one handle built from a
//! `StoreConfigManifest`. Session and knowledge-management code receive a
//! `MemoryStore` and never see which backend is underneath.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::application::repository_factory::{
    create_agent_memory_repository, create_execution_memory_repository, create_knowledge_repository,
    create_ticket_memory_repository,
};
use crate::domain::agent_memory::{AgentId, ScoredMemory};
use crate::domain::knowledge::{CommitId, Knowledge};
use crate::domain::repository::{
    AgentMemoryRepository, ExecutionMemoryRepository, KnowledgeRepository, RepositoryError,
    StorageBackend, TicketMemoryRepository,
};
use crate::domain::store_config::{KnowledgeConfig, SearchConfig, StoreConfigManifest};
use crate::domain::validation::ValidationError;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryAgentMemoryRepository, InMemoryExecutionMemoryRepository, InMemoryKnowledgeRepository,
    InMemoryTicketMemoryRepository,
};

#[derive(Clone)]
pub struct MemoryStore {
    agent_memories: Arc<dyn AgentMemoryRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    execution_memories: Arc<ExecutionMemoryRepository>,
    ticket_memories: Arc<TicketMemoryRepository>,
    search: SearchConfig,
    knowledge_limits: KnowledgeConfig,
    database: Option<Database>,
}

impl MemoryStore {
    /// Process-local store with default settings.
    pub fn in_memory() -> Self {
        let config = StoreConfigManifest::default();
        Self {
            agent_memories: Arc::new(InMemoryAgentMemoryRepository::new()),
            knowledge: Arc::new(InMemoryKnowledgeRepository::new()),
            execution_memories: Arc::new(InMemoryExecutionMemoryRepository::new()),
            ticket_memories: Arc::new(InMemoryTicketMemoryRepository::new()),
            search: config.spec.search,
            knowledge_limits: config.spec.knowledge,
            database: None,
        }
    }

    /// Connects (and migrates, if configured) according to the manifest.
    pub async fn from_config(config: &StoreConfigManifest) -> Result<Self> {
        config.validate()?;
        let backend = config.storage_backend()?;

        let database = match &backend {
            StorageBackend::InMemory => None,
            StorageBackend::PostgreSQL(pg) => Some(Database::new(pg).await?),
        };

        let store = Self::assemble(&backend, database, config)?;
        info!(
            backend = if store.database.is_some() { "postgres" } else { "in_memory" },
            "Memory store ready"
        );
        Ok(store)
    }

    fn assemble(
        backend: &StorageBackend,
        database: Option<Database>,
        config: &StoreConfigManifest,
    ) -> Result<Self> {
        let pool = database.as_ref().map(Database::get_pool);
        Ok(Self {
            agent_memories: create_agent_memory_repository(backend, pool)?,
            knowledge: create_knowledge_repository(backend, pool)?,
            execution_memories: create_execution_memory_repository(backend, pool)?,
            ticket_memories: create_ticket_memory_repository(backend, pool)?,
            search: config.spec.search.clone(),
            knowledge_limits: config.spec.knowledge.clone(),
            database,
        })
    }

    pub fn agent_memories(&self) -> &Arc<dyn AgentMemoryRepository> {
        &self.agent_memories
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeRepository> {
        &self.knowledge
    }

    pub fn execution_memories(&self) -> &Arc<ExecutionMemoryRepository> {
        &self.execution_memories
    }

    pub fn ticket_memories(&self) -> &Arc<TicketMemoryRepository> {
        &self.ticket_memories
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Agent memory search with the configured default limit when `limit` is `None`.
    pub async fn search_agent_memories(
        &self,
        agent_id: &AgentId,
        query: &[f32],
        limit: Option<usize>,
    ) -> Result<Vec<ScoredMemory>, RepositoryError> {
        let limit = limit.unwrap_or(self.search.default_limit);
        self.agent_memories.search(agent_id, query, limit).await
    }

    /// Fails if storing `knowledge` would push its topic above
    /// `max_topic_size_bytes`. The slug's current content is replaced, not added.
    pub async fn ensure_knowledge_quota(&self, knowledge: &Knowledge) -> Result<(), RepositoryError> {
        let current = self.knowledge.size(&knowledge.topic).await?;
        let replaced = self
            .knowledge
            .get(&knowledge.topic, &knowledge.slug)
            .await?
            .map(|existing| existing.content.len())
            .unwrap_or(0);

        let projected = current.saturating_sub(replaced) + knowledge.content.len();
        let limit = self.knowledge_limits.max_topic_size_bytes;
        if projected > limit {
            return Err(ValidationError::Invalid(format!(
                "topic {} would hold {} bytes, above the {} byte limit",
                knowledge.topic, projected, limit
            ))
            .into());
        }
        Ok(())
    }

    /// Quota check followed by `put`. The two steps are not atomic.
    pub async fn put_knowledge(&self, knowledge: &Knowledge) -> Result<CommitId, RepositoryError> {
        self.ensure_knowledge_quota(knowledge).await?;
        self.knowledge.put(knowledge).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent_memory::AgentMemory;
    use crate::domain::clock::FixedClock;
    use crate::domain::knowledge::{Slug, Topic};
    use chrono::{DateTime, Duration};

    fn clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
    }

    async fn store_with_quota(bytes: usize) -> MemoryStore {
        let mut config = StoreConfigManifest::default();
        config.spec.knowledge.max_topic_size_bytes = bytes;
        config.spec.search.default_limit = 2;
        MemoryStore::from_config(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_quota_counts_replaced_content_once() {
        let store = store_with_quota(10).await;
        let clock = clock();
        let topic = Topic::new("ops");

        let first = Knowledge::new(topic.clone(), Slug::new("a"), "A", "12345678", "alice", &clock);
        store.put_knowledge(&first).await.unwrap();

        clock.advance(Duration::seconds(1));
        let revision = first.revise("A", "1234567890", "alice", &clock);
        store.put_knowledge(&revision).await.unwrap();

        let other = Knowledge::new(topic.clone(), Slug::new("b"), "B", "x", "alice", &clock);
        let err = store.put_knowledge(&other).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.knowledge().size(&topic).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_default_search_limit_applies() {
        let store = store_with_quota(1024).await;
        let clock = clock();
        let agent = AgentId::new("planner");
        for i in 0..4 {
            let memory = AgentMemory::new(agent.clone(), format!("task {i}"), vec![1.0, i as f32], &clock);
            store.agent_memories().save(&memory).await.unwrap();
        }

        assert_eq!(store.search_agent_memories(&agent, &[1.0, 0.0], None).await.unwrap().len(), 2);
        assert_eq!(store.search_agent_memories(&agent, &[1.0, 0.0], Some(0)).await.unwrap().len(), 4);
    }

    #[test]
    fn test_in_memory_store_has_no_database() {
        assert!(MemoryStore::in_memory().database().is_none());
    }
}
