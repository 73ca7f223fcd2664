// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Knowledge Repository
//!
//! `knowledge_slugs` holds one row per `(topic, slug)` with its lifecycle
//! state; `knowledge_commits` holds every commit ever written. A `put` writes
//! the commit and reactivates the slug in a single transaction.
//!
//! Text ordering uses the `"C"` collation so slugs, topics and commit ids sort
//! bytewise, the same order the in-memory store produces.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::domain::knowledge::{
    CommitId, Knowledge, KnowledgeState, Slug, SlugSummary, Topic, TopicSummary,
};
use crate::domain::repository::{KnowledgeRepository, RepositoryError};
use crate::domain::validation::ValidationError;

/// Latest commit of each active slug in topic `$1`.
const LATEST_ACTIVE: &str = r#"
    SELECT * FROM (
        SELECT c.topic, c.slug, c.commit_id, c.name, c.content, c.author,
               c.created_at_ns, c.updated_at_ns, s.state,
               ROW_NUMBER() OVER (
                   PARTITION BY c.slug
                   ORDER BY c.updated_at_ns DESC, c.commit_id COLLATE "C" DESC
               ) AS commit_rank
        FROM knowledge_commits c
        JOIN knowledge_slugs s ON s.topic = c.topic AND s.slug = c.slug
        WHERE s.topic = $1 AND s.state = 'active'
    ) ranked
    WHERE commit_rank = 1
"#;

pub struct PostgresKnowledgeRepository {
    pool: PgPool,
}

impl PostgresKnowledgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Nanoseconds since the epoch, the unit `knowledge_commits` stores.
fn to_epoch_nanos(at: DateTime<Utc>) -> Result<i64, RepositoryError> {
    at.timestamp_nanos_opt().ok_or_else(|| {
        ValidationError::Invalid(format!("{} is outside the storable nanosecond range", at)).into()
    })
}

/// Stored slug states are written by `put`/`archive` only; anything else is corrupt data.
fn parse_stored_state(raw: &str) -> Result<KnowledgeState, RepositoryError> {
    KnowledgeState::parse(raw)
        .map_err(|e| RepositoryError::Serialization(format!("knowledge_slugs.state: {}", e)))
}

fn parse_knowledge_row(row: &PgRow) -> Result<Knowledge, RepositoryError> {
    let state: String = row.try_get("state")?;
    Ok(Knowledge {
        topic: Topic::new(row.try_get::<String, _>("topic")?),
        slug: Slug::new(row.try_get::<String, _>("slug")?),
        commit_id: CommitId(row.try_get("commit_id")?),
        name: row.try_get("name")?,
        content: row.try_get("content")?,
        author: row.try_get("author")?,
        created_at: DateTime::from_timestamp_nanos(row.try_get("created_at_ns")?),
        updated_at: DateTime::from_timestamp_nanos(row.try_get("updated_at_ns")?),
        state: parse_stored_state(&state)?,
    })
}

#[async_trait]
impl KnowledgeRepository for PostgresKnowledgeRepository {
    async fn put(&self, knowledge: &Knowledge) -> Result<CommitId, RepositoryError> {
        let commit = knowledge.to_commit()?;
        let context = format!("put knowledge {}/{}", commit.topic, commit.slug);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::database(&context, e))?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_slugs (topic, slug, state, updated_at)
            VALUES ($1, $2, 'active', NOW())
            ON CONFLICT (topic, slug) DO UPDATE SET
                state = 'active',
                updated_at = NOW()
            "#,
        )
        .bind(commit.topic.as_str())
        .bind(commit.slug.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::database(&context, e))?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_commits (
                topic, slug, commit_id, name, content, author, created_at_ns, updated_at_ns
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (topic, slug, commit_id) DO NOTHING
            "#,
        )
        .bind(commit.topic.as_str())
        .bind(commit.slug.as_str())
        .bind(commit.commit_id.as_str())
        .bind(&commit.name)
        .bind(&commit.content)
        .bind(&commit.author)
        .bind(to_epoch_nanos(commit.created_at)?)
        .bind(to_epoch_nanos(commit.updated_at)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::database(&context, e))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::database(&context, e))?;

        debug!(topic = %commit.topic, slug = %commit.slug, commit_id = %commit.commit_id, "Stored knowledge commit");
        Ok(commit.commit_id)
    }

    async fn get(&self, topic: &Topic, slug: &Slug) -> Result<Option<Knowledge>, RepositoryError> {
        let row = sqlx::query(&format!("{} AND slug = $2", LATEST_ACTIVE))
            .bind(topic.as_str())
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(format!("get knowledge {}/{}", topic, slug), e))?;

        row.as_ref().map(parse_knowledge_row).transpose()
    }

    async fn get_by_commit(
        &self,
        topic: &Topic,
        slug: &Slug,
        commit_id: &CommitId,
    ) -> Result<Option<Knowledge>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT c.topic, c.slug, c.commit_id, c.name, c.content, c.author,
                   c.created_at_ns, c.updated_at_ns, s.state
            FROM knowledge_commits c
            JOIN knowledge_slugs s ON s.topic = c.topic AND s.slug = c.slug
            WHERE c.topic = $1 AND c.slug = $2 AND c.commit_id = $3
            "#,
        )
        .bind(topic.as_str())
        .bind(slug.as_str())
        .bind(commit_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("get knowledge commit {}", commit_id), e))?;

        row.as_ref().map(parse_knowledge_row).transpose()
    }

    async fn list(&self, topic: &Topic) -> Result<Vec<Knowledge>, RepositoryError> {
        let rows = sqlx::query(&format!("{} ORDER BY slug COLLATE \"C\"", LATEST_ACTIVE))
            .bind(topic.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(format!("list knowledge in {}", topic), e))?;

        rows.iter().map(parse_knowledge_row).collect()
    }

    async fn list_slugs(&self, topic: &Topic) -> Result<Vec<SlugSummary>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT slug, name FROM ({}) latest ORDER BY slug COLLATE \"C\"",
            LATEST_ACTIVE
        ))
        .bind(topic.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("list slugs in {}", topic), e))?;

        rows.iter()
            .map(|row| {
                Ok(SlugSummary {
                    slug: Slug::new(row.try_get::<String, _>("slug")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn list_topics(&self) -> Result<Vec<TopicSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT topic, COUNT(*) AS active_slugs
            FROM knowledge_slugs
            WHERE state = 'active'
            GROUP BY topic
            ORDER BY topic COLLATE "C"
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database("list knowledge topics", e))?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("active_slugs")?;
                Ok(TopicSummary {
                    topic: Topic::new(row.try_get::<String, _>("topic")?),
                    active_slugs: count as usize,
                })
            })
            .collect()
    }

    async fn archive(&self, topic: &Topic, slug: &Slug) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE knowledge_slugs SET state = 'archived', updated_at = NOW() WHERE topic = $1 AND slug = $2",
        )
        .bind(topic.as_str())
        .bind(slug.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("archive knowledge {}/{}", topic, slug), e))?;

        if result.rows_affected() > 0 {
            debug!(topic = %topic, slug = %slug, "Archived knowledge slug");
        }
        Ok(())
    }

    async fn size(&self, topic: &Topic) -> Result<usize, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(SUM(octet_length(content)), 0)::BIGINT AS bytes FROM ({}) latest",
            LATEST_ACTIVE
        ))
        .bind(topic.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("size of topic {}", topic), e))?;

        let bytes: i64 = row.try_get("bytes")?;
        Ok(bytes as usize)
    }
}
