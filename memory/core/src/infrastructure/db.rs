// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that can be
//! injected into all PostgreSQL repository implementations.
//!
//! The schema lives in `memory/core/migrations` and is embedded at compile
//! time; `migrate()` installs the pgvector extension and the memory tables.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::domain::repository::PostgresConfig;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let database = Self { pool };
        if config.run_migrations {
            database.migrate().await?;
        }
        Ok(database)
    }

    /// Wrap an existing pool (tests, shared pools).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to apply memory store migrations")?;
        info!("Memory store migrations applied");
        Ok(())
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
