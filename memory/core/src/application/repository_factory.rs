// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! The in-memory backend needs no pool; the PostgreSQL backend requires one
//! and the factory refuses to build without it.

use anyhow::{bail, Result};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repository::{
    AgentMemoryRepository, ExecutionMemoryRepository, KnowledgeRepository, StorageBackend,
    TicketMemoryRepository,
};
use crate::infrastructure::repositories::{
    InMemoryAgentMemoryRepository, InMemoryExecutionMemoryRepository, InMemoryKnowledgeRepository,
    InMemoryTicketMemoryRepository, PostgresAgentMemoryRepository, PostgresExecutionMemoryRepository,
    PostgresKnowledgeRepository, PostgresTicketMemoryRepository,
};

fn require_pool(backend: &StorageBackend, pool: Option<&PgPool>) -> Result<PgPool> {
    match pool {
        Some(pool) => Ok(pool.clone()),
        None => bail!("storage backend '{}' requires a PostgreSQL pool", backend_name(backend)),
    }
}

fn backend_name(backend: &StorageBackend) -> &'static str {
    match backend {
        StorageBackend::InMemory => "in_memory",
        StorageBackend::PostgreSQL(_) => "postgres",
    }
}

/// Creates an AgentMemoryRepository implementation based on the configured backend
pub fn create_agent_memory_repository(
    backend: &StorageBackend,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn AgentMemoryRepository>> {
    let repository: Arc<dyn AgentMemoryRepository> = match backend {
        StorageBackend::InMemory => Arc::new(InMemoryAgentMemoryRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresAgentMemoryRepository::new(require_pool(backend, pool)?))
        }
    };
    Ok(repository)
}

/// Creates a KnowledgeRepository implementation based on the configured backend
pub fn create_knowledge_repository(
    backend: &StorageBackend,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn KnowledgeRepository>> {
    let repository: Arc<dyn KnowledgeRepository> = match backend {
        StorageBackend::InMemory => Arc::new(InMemoryKnowledgeRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresKnowledgeRepository::new(require_pool(backend, pool)?))
        }
    };
    Ok(repository)
}

/// Creates an execution memory history repository based on the configured backend
pub fn create_execution_memory_repository(
    backend: &StorageBackend,
    pool: Option<&PgPool>,
) -> Result<Arc<ExecutionMemoryRepository>> {
    let repository: Arc<ExecutionMemoryRepository> = match backend {
        StorageBackend::InMemory => Arc::new(InMemoryExecutionMemoryRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresExecutionMemoryRepository::new(require_pool(backend, pool)?))
        }
    };
    Ok(repository)
}

/// Creates a ticket memory history repository based on the configured backend
pub fn create_ticket_memory_repository(
    backend: &StorageBackend,
    pool: Option<&PgPool>,
) -> Result<Arc<TicketMemoryRepository>> {
    let repository: Arc<TicketMemoryRepository> = match backend {
        StorageBackend::InMemory => Arc::new(InMemoryTicketMemoryRepository::new()),
        StorageBackend::PostgreSQL(_) => {
            Arc::new(PostgresTicketMemoryRepository::new(require_pool(backend, pool)?))
        }
    };
    Ok(repository)
}
