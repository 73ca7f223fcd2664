// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Agent Memory Repository
//!
//! Production `AgentMemoryRepository` backed by the `agent_memories` table.
//! Embeddings are stored in a pgvector column and ranked with the cosine
//! distance operator `<=>`; rows whose vector has a different dimension or
//! zero norm never reach the ranking.
//!
//! Batch operations issue one statement per item and race each statement
//! against the caller's `CancellationToken`. A batch interrupted midway
//! reports which ids finished and which were abandoned.

use async_trait::async_trait;
use chrono::SubsecRound;
use futures::future::join_all;
use sqlx::postgres::{PgPool, PgQueryResult, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row};
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::agent_memory::{AgentId, AgentMemory, AgentMemoryId, ScoreUpdate, ScoredMemory};
use crate::domain::embedding::{self, Embedding};
use crate::domain::query::{MemoryPredicate, PredicateValue};
use crate::domain::repository::{AgentMemoryRepository, RepositoryError};
use crate::infrastructure::pgvector::{parse_vector_literal, to_vector_literal};

const COLUMNS: &str = "agent_id, id, task_query, query_embedding::text AS query_embedding, recorded_at, \
                       successes, problems, improvements, quality_score, last_used_at";

pub struct PostgresAgentMemoryRepository {
    pool: PgPool,
}

impl PostgresAgentMemoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_memory_row(row: &PgRow) -> Result<AgentMemory, RepositoryError> {
    let embedding: String = row.try_get("query_embedding")?;
    let successes: Json<Vec<String>> = row.try_get("successes")?;
    let problems: Json<Vec<String>> = row.try_get("problems")?;
    let improvements: Json<Vec<String>> = row.try_get("improvements")?;

    Ok(AgentMemory {
        id: AgentMemoryId::from_string(row.try_get::<String, _>("id")?),
        agent_id: AgentId::new(row.try_get::<String, _>("agent_id")?),
        task_query: row.try_get("task_query")?,
        query_embedding: Embedding::new(parse_vector_literal(&embedding)?),
        timestamp: row.try_get("recorded_at")?,
        successes: successes.0,
        problems: problems.0,
        improvements: improvements.0,
        quality_score: row.try_get("quality_score")?,
        last_used_at: row.try_get("last_used_at")?,
    })
}

enum ItemOutcome {
    Applied(u64),
    Failed(sqlx::Error),
    Cancelled,
}

/// Runs one statement per item concurrently, each raced against `cancel`.
///
/// Returns the number of rows affected. If any item was abandoned the result
/// is `PartialBatch`; otherwise the first statement failure is returned.
async fn run_batch<F>(
    op: &'static str,
    agent_id: &AgentId,
    items: Vec<(String, F)>,
    cancel: &CancellationToken,
) -> Result<usize, RepositoryError>
where
    F: Future<Output = Result<PgQueryResult, sqlx::Error>> + Send,
{
    if cancel.is_cancelled() {
        return Err(RepositoryError::Cancelled);
    }

    let outcomes = join_all(items.into_iter().map(|(key, statement)| async move {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => ItemOutcome::Cancelled,
            result = statement => match result {
                Ok(done) => ItemOutcome::Applied(done.rows_affected()),
                Err(e) => ItemOutcome::Failed(e),
            },
        };
        (key, outcome)
    }))
    .await;

    let mut affected = 0usize;
    let mut completed = Vec::new();
    let mut cancelled = Vec::new();
    let mut first_error = None;
    for (key, outcome) in outcomes {
        match outcome {
            ItemOutcome::Applied(rows) => {
                affected += rows as usize;
                completed.push(key);
            }
            ItemOutcome::Failed(e) => {
                warn!(agent_id = %agent_id, op, item = %key, error = %e, "Batch item failed");
                first_error.get_or_insert(e);
            }
            ItemOutcome::Cancelled => cancelled.push(key),
        }
    }

    metrics::counter!("aegis_memory_batch_items_total", "op" => op, "outcome" => "applied")
        .increment(completed.len() as u64);
    metrics::counter!("aegis_memory_batch_items_total", "op" => op, "outcome" => "cancelled")
        .increment(cancelled.len() as u64);

    if !cancelled.is_empty() {
        warn!(agent_id = %agent_id, op, completed = completed.len(), cancelled = cancelled.len(), "Batch interrupted by cancellation");
        return Err(RepositoryError::PartialBatch { completed, cancelled });
    }
    if let Some(e) = first_error {
        return Err(RepositoryError::database(format!("{} batch for agent {}", op, agent_id), e));
    }

    debug!(agent_id = %agent_id, op, affected, "Batch applied");
    Ok(affected)
}

#[async_trait]
impl AgentMemoryRepository for PostgresAgentMemoryRepository {
    async fn save(&self, memory: &AgentMemory) -> Result<(), RepositoryError> {
        memory.validate()?;
        let memory = memory.normalized();

        sqlx::query(
            r#"
            INSERT INTO agent_memories (
                agent_id, id, task_query, query_embedding, recorded_at,
                successes, problems, improvements, quality_score, last_used_at
            )
            VALUES ($1, $2, $3, $4::vector, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (agent_id, id) DO UPDATE SET
                task_query = EXCLUDED.task_query,
                query_embedding = EXCLUDED.query_embedding,
                recorded_at = EXCLUDED.recorded_at,
                successes = EXCLUDED.successes,
                problems = EXCLUDED.problems,
                improvements = EXCLUDED.improvements,
                quality_score = EXCLUDED.quality_score,
                last_used_at = EXCLUDED.last_used_at
            "#,
        )
        .bind(memory.agent_id.as_str())
        .bind(memory.id.as_str())
        .bind(&memory.task_query)
        .bind(to_vector_literal(memory.query_embedding.as_slice()))
        .bind(memory.timestamp)
        .bind(Json(&memory.successes))
        .bind(Json(&memory.problems))
        .bind(Json(&memory.improvements))
        .bind(memory.quality_score)
        .bind(memory.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("save agent memory {}", memory.id), e))?;

        debug!(agent_id = %memory.agent_id, memory_id = %memory.id, "Saved agent memory");
        Ok(())
    }

    async fn get(&self, agent_id: &AgentId, id: &AgentMemoryId) -> Result<AgentMemory, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agent_memories WHERE agent_id = $1 AND id = $2",
            COLUMNS
        ))
        .bind(agent_id.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("get agent memory {}", id), e))?;

        match row {
            Some(row) => parse_memory_row(&row),
            None => Err(RepositoryError::NotFound(format!(
                "agent memory {} for agent {}",
                id, agent_id
            ))),
        }
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

        let limit = (limit > 0).then_some(limit as i64);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM agent_memories
            WHERE agent_id = $1
              AND vector_dims(query_embedding) = $3
              AND vector_norm(query_embedding) > 0
            ORDER BY query_embedding <=> $2::vector, id COLLATE "C"
            LIMIT $4
            "#,
            COLUMNS
        ))
        .bind(agent_id.as_str())
        .bind(to_vector_literal(query))
        .bind(query.len() as i32)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("search agent memories of {}", agent_id), e))?;

        let mut scored = rows
            .iter()
            .map(|row| {
                let memory = parse_memory_row(row)?;
                Ok(ScoredMemory {
                    similarity: embedding::similarity(query, memory.query_embedding.as_slice()),
                    memory,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        // Order by the reported score, not by pgvector's distance
        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });

        debug!(agent_id = %agent_id, hits = scored.len(), "Searched agent memories");
        Ok(scored)
    }

    async fn update_score_batch(
        &self,
        agent_id: &AgentId,
        updates: &HashMap<AgentMemoryId, ScoreUpdate>,
        cancel: &CancellationToken,
    ) -> Result<usize, RepositoryError> {
        let items = updates
            .iter()
            .map(|(id, update)| {
                let statement = sqlx::query(
                    "UPDATE agent_memories SET quality_score = $3, last_used_at = $4 WHERE agent_id = $1 AND id = $2",
                )
                .bind(agent_id.as_str())
                .bind(id.as_str())
                .bind(update.score)
                .bind(update.last_used_at.trunc_subsecs(6))
                .execute(&self.pool);
                (id.to_string(), statement)
            })
            .collect();

        run_batch("update_score", agent_id, items, cancel).await
    }

    async fn delete_batch(
        &self,
        agent_id: &AgentId,
        ids: &[AgentMemoryId],
        cancel: &CancellationToken,
    ) -> Result<usize, RepositoryError> {
        let items = ids
            .iter()
            .map(|id| {
                let statement = sqlx::query("DELETE FROM agent_memories WHERE agent_id = $1 AND id = $2")
                    .bind(agent_id.as_str())
                    .bind(id.as_str())
                    .execute(&self.pool);
                (id.to_string(), statement)
            })
            .collect();

        run_batch("delete", agent_id, items, cancel).await
    }

    async fn list(&self, agent_id: &AgentId) -> Result<Vec<AgentMemory>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agent_memories WHERE agent_id = $1 ORDER BY recorded_at DESC, id COLLATE \"C\" ASC",
            COLUMNS
        ))
        .bind(agent_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("list agent memories of {}", agent_id), e))?;

        rows.iter().map(parse_memory_row).collect()
    }

    async fn list_agent_ids(&self) -> Result<HashMap<AgentId, usize>, RepositoryError> {
        let rows = sqlx::query("SELECT agent_id, COUNT(*) AS memories FROM agent_memories GROUP BY agent_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::database("list agent ids", e))?;

        rows.iter()
            .map(|row| {
                let agent_id: String = row.try_get("agent_id")?;
                let count: i64 = row.try_get("memories")?;
                Ok((AgentId::new(agent_id), count as usize))
            })
            .collect()
    }

    async fn find_matching(
        &self,
        agent_id: &AgentId,
        predicates: &[MemoryPredicate],
    ) -> Result<Vec<AgentMemory>, RepositoryError> {
        for predicate in predicates {
            predicate.validate()?;
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM agent_memories WHERE agent_id = ", COLUMNS));
        builder.push_bind(agent_id.as_str());
        for predicate in predicates {
            builder
                .push(" AND ")
                .push(predicate.field.column())
                .push(" ")
                .push(predicate.op.sql())
                .push(" ");
            match predicate.value {
                PredicateValue::Float(v) => builder.push_bind(v),
                PredicateValue::Time(at) => builder.push_bind(at),
            };
        }
        builder.push(" ORDER BY recorded_at DESC, id COLLATE \"C\" ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(format!("find matching memories of {}", agent_id), e))?;

        rows.iter().map(parse_memory_row).collect()
    }
}
