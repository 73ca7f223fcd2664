// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Embedding-indexed memory and knowledge store for AEGIS agents.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Agent memories, versioned knowledge and execution/ticket
//!   history behind interchangeable in-memory and PostgreSQL adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
