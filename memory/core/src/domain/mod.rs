// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entities, value objects and repository ports of the memory store.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and contracts; no I/O

pub mod agent_memory;
pub mod clock;
pub mod embedding;
pub mod history;
pub mod knowledge;
pub mod query;
pub mod repository;
pub mod store_config;
pub mod validation;
