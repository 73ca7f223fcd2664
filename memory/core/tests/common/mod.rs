// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the integration tests.
//!
//! PostgreSQL runs read `AEGIS_MEMORY_TEST_DATABASE_URL` and are skipped when
//! it is unset. Every PostgreSQL scenario works under fresh random agent ids,
//! topics and schema ids so runs never see each other's rows.

#![allow(dead_code)]

use aegis_memory_core::application::MemoryStore;
use aegis_memory_core::domain::clock::FixedClock;
use aegis_memory_core::domain::store_config::{BackendKind, StoreConfigManifest};
use chrono::DateTime;

pub fn clock() -> FixedClock {
    FixedClock::new(DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap())
}

/// Random suffix keeping PostgreSQL scenarios isolated from each other.
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

pub async fn postgres_store() -> Option<MemoryStore> {
    let url = std::env::var("AEGIS_MEMORY_TEST_DATABASE_URL").ok()?;
    let mut config = StoreConfigManifest::default();
    config.spec.storage.backend = BackendKind::Postgres;
    config.spec.storage.connection_string = Some(url);
    config.spec.storage.run_migrations = true;
    Some(
        MemoryStore::from_config(&config)
            .await
            .expect("connect to AEGIS_MEMORY_TEST_DATABASE_URL"),
    )
}
