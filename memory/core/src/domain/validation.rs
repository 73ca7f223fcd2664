// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Validation
//!
//! Write-path validation shared by knowledge, agent memory and history
//! records. Every failure here is raised before anything reaches a storage
//! adapter, so a rejected write is never partially persisted.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Field and storage-key validation

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::embedding;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid embedding: vector of length {length} is empty, all zeros or not finite")]
    InvalidEmbedding { length: usize },

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} exceeds {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("invalid {field} '{value}': {reason}")]
    InvalidKey {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Rejects vectors the similarity engine cannot rank.
pub fn require_embedding(vector: &[f32]) -> Result<(), ValidationError> {
    if embedding::is_invalid(vector) {
        metrics::counter!("aegis_memory_rejected_embeddings_total").increment(1);
        tracing::warn!(length = vector.len(), "Rejected write carrying an invalid embedding");
        return Err(ValidationError::InvalidEmbedding {
            length: vector.len(),
        });
    }
    Ok(())
}

/// Timestamps must be representable as `i64` nanoseconds since the epoch,
/// the precision commits are addressed and stored with.
pub fn require_nanos_timestamp(field: &'static str, at: DateTime<Utc>) -> Result<(), ValidationError> {
    if at.timestamp_nanos_opt().is_none() {
        return Err(ValidationError::Invalid(format!(
            "{} {} is outside the storable nanosecond range",
            field, at
        )));
    }
    Ok(())
}

pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(())
}

pub fn require_max_chars(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

/// Checks that a value can be used as a storage key segment.
///
/// Keys end up as path segments of nested collections on the remote side, so
/// separators, dot-delimited segments and double underscores are refused.
pub fn require_storage_key(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &'static str| ValidationError::InvalidKey {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    if value.contains('/') || value.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if value.starts_with('.') || value.ends_with('.') {
        return Err(invalid("must not start or end with '.'"));
    }
    if value.contains("__") {
        return Err(invalid("must not contain '__'"));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid("must not contain control characters"));
    }
    Ok(())
}
