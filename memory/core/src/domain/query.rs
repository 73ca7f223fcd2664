// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Field predicates for selecting agent memories (curation and pruning jobs).
//!
//! A predicate is `field <op> value`; a list of predicates is a conjunction.
//! Evaluation is an explicit match over the known fields, and the PostgreSQL
//! adapter compiles the same variants into a parameterised `WHERE` clause.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::agent_memory::AgentMemory;
use crate::domain::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryField {
    QualityScore,
    Timestamp,
    LastUsedAt,
}

impl MemoryField {
    pub fn column(&self) -> &'static str {
        match self {
            MemoryField::QualityScore => "quality_score",
            MemoryField::Timestamp => "recorded_at",
            MemoryField::LastUsedAt => "last_used_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PredicateValue {
    Float(f64),
    Time(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryPredicate {
    pub field: MemoryField,
    pub op: Comparison,
    pub value: PredicateValue,
}

impl MemoryPredicate {
    pub fn new(field: MemoryField, op: Comparison, value: PredicateValue) -> Self {
        Self { field, op, value }
    }

    pub fn score(op: Comparison, score: f64) -> Self {
        Self::new(MemoryField::QualityScore, op, PredicateValue::Float(score))
    }

    pub fn timestamp(op: Comparison, at: DateTime<Utc>) -> Self {
        Self::new(MemoryField::Timestamp, op, PredicateValue::Time(at))
    }

    pub fn last_used(op: Comparison, at: DateTime<Utc>) -> Self {
        Self::new(MemoryField::LastUsedAt, op, PredicateValue::Time(at))
    }

    /// Rejects field/value combinations that cannot be compared.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.field, self.value) {
            (MemoryField::QualityScore, PredicateValue::Float(v)) if v.is_finite() => Ok(()),
            (MemoryField::Timestamp | MemoryField::LastUsedAt, PredicateValue::Time(_)) => Ok(()),
            (field, value) => Err(ValidationError::Invalid(format!(
                "predicate value {:?} is not comparable with field {:?}",
                value, field
            ))),
        }
    }

    /// Evaluates the predicate against a record. A memory that was never used
    /// has no `last_used_at` and matches no `LastUsedAt` predicate.
    pub fn matches(&self, memory: &AgentMemory) -> bool {
        let ordering = match (self.field, self.value) {
            (MemoryField::QualityScore, PredicateValue::Float(v)) => memory.quality_score.partial_cmp(&v),
            (MemoryField::Timestamp, PredicateValue::Time(at)) => Some(memory.timestamp.cmp(&at)),
            (MemoryField::LastUsedAt, PredicateValue::Time(at)) => {
                memory.last_used_at.map(|used| used.cmp(&at))
            }
            _ => None,
        };
        ordering.is_some_and(|o| self.op.holds(o))
    }
}

pub fn matches_all(predicates: &[MemoryPredicate], memory: &AgentMemory) -> bool {
    predicates.iter().all(|p| p.matches(memory))
}
