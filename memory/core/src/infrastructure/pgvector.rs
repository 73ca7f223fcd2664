// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Text encoding for pgvector `vector` values.
//!
//! Vectors cross the wire in pgvector's text form (`[1,0.5,-2]`): bound as
//! `$n::vector` on write and selected as `column::text` on read.

use crate::domain::repository::RepositoryError;

pub fn to_vector_literal(values: &[f32]) -> String {
    let mut out = String::with_capacity(values.len() * 8 + 2);
    out.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

pub fn parse_vector_literal(text: &str) -> Result<Vec<f32>, RepositoryError> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| RepositoryError::Serialization(format!("malformed vector literal '{}'", text)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim().parse::<f32>().map_err(|e| {
                RepositoryError::Serialization(format!("bad vector component '{}': {}", part, e))
            })
        })
        .collect()
}
