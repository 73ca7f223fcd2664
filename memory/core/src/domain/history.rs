// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution and Ticket Memory History
//!
//! Append-only, per-schema history of memory snapshots. Each write appends a
//! new snapshot; the current memory of a schema is simply the last one
//! appended, while every snapshot stays searchable by embedding.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Snapshot types and the contract shared by both history kinds

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::clock::Clock;
use crate::domain::embedding::Embedding;
use crate::domain::validation::{self, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub String);

impl SchemaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Behaviour shared by every snapshot kind stored in a schema history.
pub trait HistorySnapshot:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Entity label used in logs, metrics and as the PostgreSQL table name.
    const KIND: &'static str;

    fn schema_id(&self) -> &SchemaId;

    fn embedding(&self) -> Option<&Embedding>;

    fn set_embedding(&mut self, embedding: Option<Embedding>);

    /// Field checks specific to the snapshot kind.
    fn validate_fields(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Full write-path validation. An absent embedding is allowed (the
    /// snapshot is then invisible to similarity search); a present one must
    /// pass the embedding guard.
    fn validate(&self) -> Result<(), ValidationError> {
        validation::require_storage_key("schema_id", self.schema_id().as_str())?;
        if let Some(embedding) = self.embedding() {
            validation::require_embedding(embedding.as_slice())?;
        }
        self.validate_fields()
    }
}

/// What an agent learned while executing against a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMemory {
    pub schema_id: SchemaId,
    /// Practices worth keeping.
    #[serde(default)]
    pub keep: String,
    /// Practices to change next time.
    #[serde(default)]
    pub change: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionMemory {
    pub fn new(
        schema_id: SchemaId,
        keep: impl Into<String>,
        change: impl Into<String>,
        notes: impl Into<String>,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            schema_id,
            keep: keep.into(),
            change: change.into(),
            notes: notes.into(),
            embedding: None,
            created_at: clock.now().trunc_subsecs(6),
        }
    }

    pub fn with_embedding(mut self, embedding: impl Into<Embedding>) -> Self {
        self.embedding = Some(embedding.into());
        self
    }
}

impl HistorySnapshot for ExecutionMemory {
    const KIND: &'static str = "execution_memories";

    fn schema_id(&self) -> &SchemaId {
        &self.schema_id
    }

    fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    fn set_embedding(&mut self, embedding: Option<Embedding>) {
        self.embedding = embedding;
    }

    fn validate_fields(&self) -> Result<(), ValidationError> {
        if self.keep.trim().is_empty() && self.change.trim().is_empty() && self.notes.trim().is_empty() {
            return Err(ValidationError::Invalid(
                "execution memory needs at least one of keep, change or notes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Insights accumulated from tickets created against a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMemory {
    pub schema_id: SchemaId,
    pub insights: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    pub created_at: DateTime<Utc>,
}

impl TicketMemory {
    pub fn new(schema_id: SchemaId, insights: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            schema_id,
            insights: insights.into(),
            embedding: None,
            created_at: clock.now().trunc_subsecs(6),
        }
    }

    pub fn with_embedding(mut self, embedding: impl Into<Embedding>) -> Self {
        self.embedding = Some(embedding.into());
        self
    }
}

impl HistorySnapshot for TicketMemory {
    const KIND: &'static str = "ticket_memories";

    fn schema_id(&self) -> &SchemaId {
        &self.schema_id
    }

    fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    fn set_embedding(&mut self, embedding: Option<Embedding>) {
        self.embedding = embedding;
    }

    fn validate_fields(&self) -> Result<(), ValidationError> {
        validation::require_non_empty("insights", &self.insights)
    }
}
