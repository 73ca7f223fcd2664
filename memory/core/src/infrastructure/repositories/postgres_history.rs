// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL History Repository
//!
//! One append-only table per snapshot kind (`S::KIND`). Rows are ordered by a
//! `BIGSERIAL` sequence, so "latest" is the highest `seq` for a schema. The
//! snapshot body is kept as JSONB without its embedding; the embedding lives
//! in a nullable pgvector column and is re-attached on read.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::marker::PhantomData;
use tracing::debug;

use crate::domain::embedding::{self, Embedding};
use crate::domain::history::{ExecutionMemory, HistorySnapshot, SchemaId, TicketMemory};
use crate::domain::repository::{MemoryHistoryRepository, RepositoryError};
use crate::infrastructure::pgvector::{parse_vector_literal, to_vector_literal};

pub struct PostgresHistoryRepository<S: HistorySnapshot> {
    pool: PgPool,
    _snapshot: PhantomData<fn() -> S>,
}

pub type PostgresExecutionMemoryRepository = PostgresHistoryRepository<ExecutionMemory>;
pub type PostgresTicketMemoryRepository = PostgresHistoryRepository<TicketMemory>;

impl<S: HistorySnapshot> PostgresHistoryRepository<S> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _snapshot: PhantomData,
        }
    }
}

fn parse_snapshot_row<S: HistorySnapshot>(row: &PgRow) -> Result<S, RepositoryError> {
    let payload: serde_json::Value = row.try_get("payload")?;
    let vector: Option<String> = row.try_get("embedding")?;

    let mut snapshot: S = serde_json::from_value(payload)?;
    let embedding = vector
        .as_deref()
        .map(parse_vector_literal)
        .transpose()?
        .map(Embedding::new);
    snapshot.set_embedding(embedding);
    Ok(snapshot)
}

#[async_trait]
impl<S: HistorySnapshot> MemoryHistoryRepository<S> for PostgresHistoryRepository<S> {
    async fn put(&self, snapshot: &S) -> Result<(), RepositoryError> {
        snapshot.validate()?;

        let vector = snapshot.embedding().map(|e| to_vector_literal(e.as_slice()));
        let mut body = snapshot.clone();
        body.set_embedding(None);
        let payload = serde_json::to_value(&body)?;

        sqlx::query(&format!(
            "INSERT INTO {} (schema_id, payload, embedding) VALUES ($1, $2, $3::vector)",
            S::KIND
        ))
        .bind(snapshot.schema_id().as_str())
        .bind(payload)
        .bind(vector)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("append {} for {}", S::KIND, snapshot.schema_id()), e))?;

        debug!(kind = S::KIND, schema_id = %snapshot.schema_id(), "Appended history snapshot");
        Ok(())
    }

    async fn get_latest(&self, schema_id: &SchemaId) -> Result<Option<S>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT payload, embedding::text AS embedding FROM {} WHERE schema_id = $1 ORDER BY seq DESC LIMIT 1",
            S::KIND
        ))
        .bind(schema_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("latest {} for {}", S::KIND, schema_id), e))?;

        row.as_ref().map(parse_snapshot_row::<S>).transpose()
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

        let limit = (limit > 0).then_some(limit as i64);
        let rows = sqlx::query(&format!(
            r#"
            SELECT payload, embedding::text AS embedding
            FROM {}
            WHERE schema_id = $1
              AND embedding IS NOT NULL
              AND vector_dims(embedding) = $3
              AND vector_norm(embedding) > 0
            ORDER BY embedding <=> $2::vector, seq DESC
            LIMIT $4
            "#,
            S::KIND
        ))
        .bind(schema_id.as_str())
        .bind(to_vector_literal(query))
        .bind(query.len() as i32)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("search {} for {}", S::KIND, schema_id), e))?;

        rows.iter().map(parse_snapshot_row::<S>).collect()
    }

    async fn list_history(&self, schema_id: &SchemaId) -> Result<Vec<S>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT payload, embedding::text AS embedding FROM {} WHERE schema_id = $1 ORDER BY seq ASC",
            S::KIND
        ))
        .bind(schema_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("list {} for {}", S::KIND, schema_id), e))?;

        rows.iter().map(parse_snapshot_row::<S>).collect()
    }
}
