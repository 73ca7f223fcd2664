// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Memory Store Configuration
//
// Kubernetes-style manifest for the memory store:
// - Storage backend selection (in-memory or PostgreSQL + pgvector)
// - Search defaults
// - Knowledge quota
// - Logging settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "MemoryStoreConfig";

/// Top-level Kubernetes-style memory store configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MemoryStoreConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: StoreConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// PostgreSQL connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply embedded migrations on connect
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result cap used when a caller does not pass one
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Upper bound on the summed content size of a topic's active slugs
    #[serde(default = "default_max_topic_size_bytes")]
    pub max_topic_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `text`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

fn default_search_limit() -> usize {
    10
}

fn default_max_topic_size_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::InMemory,
            connection_string: None,
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_topic_size_bytes: default_max_topic_size_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for StoreConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "memory-store".to_string(),
                version: None,
                labels: None,
            },
            spec: StoreConfigSpec::default(),
        }
    }
}

impl StoreConfigManifest {
    /// Reads a manifest from disk. No env overrides are applied.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// First existing manifest in lookup order:
    /// 1. AEGIS_MEMORY_CONFIG_PATH environment variable
    /// 2. ./aegis-memory.yaml (working directory)
    /// 3. ~/.aegis/memory.yaml (user home)
    /// 4. /etc/aegis/memory.yaml (system, Unix) or C:\ProgramData\Aegis\memory.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_MEMORY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-memory.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("memory.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aegis/memory.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aegis\\memory.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Explicit path, else discovered file, else defaults. Env overrides always apply last.
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = explicit_path {
            tracing::info!("Loading memory store configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load memory store config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading memory store configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No memory store configuration found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// `AEGIS_MEMORY_*` variables win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_MEMORY_BACKEND") {
            match val.to_lowercase().as_str() {
                "in_memory" | "memory" | "inmemory" => {
                    tracing::info!("Environment override: AEGIS_MEMORY_BACKEND=in_memory");
                    self.spec.storage.backend = BackendKind::InMemory;
                }
                "postgres" | "postgresql" => {
                    tracing::info!("Environment override: AEGIS_MEMORY_BACKEND=postgres");
                    self.spec.storage.backend = BackendKind::Postgres;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AEGIS_MEMORY_BACKEND: '{}'. Expected in_memory/postgres. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(url) = std::env::var("AEGIS_MEMORY_DATABASE_URL") {
            tracing::info!("Environment override: AEGIS_MEMORY_DATABASE_URL");
            self.spec.storage.connection_string = Some(url);
        }

        if let Ok(level) = std::env::var("AEGIS_MEMORY_LOG_LEVEL") {
            tracing::info!("Environment override: AEGIS_MEMORY_LOG_LEVEL={}", level);
            self.spec.logging.level = level;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.storage.backend == BackendKind::Postgres {
            match self.spec.storage.connection_string.as_deref() {
                None | Some("") => {
                    anyhow::bail!("spec.storage.connection_string is required for the postgres backend")
                }
                Some(_) => {}
            }
            if self.spec.storage.max_connections == 0 {
                anyhow::bail!("spec.storage.max_connections must be at least 1");
            }
        }

        if self.spec.knowledge.max_topic_size_bytes == 0 {
            anyhow::bail!("spec.knowledge.max_topic_size_bytes must be greater than zero");
        }

        match self.spec.logging.format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("Invalid logging format '{}'. Expected json or text", other),
        }

        Ok(())
    }

    /// Resolve the configured backend, expanding "env:VAR_NAME" secrets.
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.spec.storage.backend {
            BackendKind::InMemory => Ok(StorageBackend::InMemory),
            BackendKind::Postgres => {
                let raw = self
                    .spec
                    .storage
                    .connection_string
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("spec.storage.connection_string is not set"))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: resolve_secret(raw)?,
                    max_connections: self.spec.storage.max_connections,
                    run_migrations: self.spec.storage.run_migrations,
                }))
            }
        }
    }
}

/// Expands "env:VAR_NAME" references; other values are returned unchanged.
fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' referenced by config is not set", var)),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = StoreConfigManifest::default();
        assert_eq!(manifest.api_version, "100monkeys.ai/v1");
        assert_eq!(manifest.kind, "MemoryStoreConfig");
        assert_eq!(manifest.spec.storage.backend, BackendKind::InMemory);
        assert_eq!(manifest.spec.search.default_limit, 10);
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.storage_backend().unwrap(), StorageBackend::InMemory);
    }

    #[test]
    fn test_parse_postgres_manifest() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: MemoryStoreConfig
metadata:
  name: prod-memory
spec:
  storage:
    backend: postgres
    connection_string: postgres://aegis:secret@db:5432/aegis
    max_connections: 12
  search:
    default_limit: 4
  logging:
    level: debug
    format: text
"#;
        let manifest = StoreConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.search.default_limit, 4);
        assert_eq!(manifest.spec.knowledge.max_topic_size_bytes, 1024 * 1024);

        match manifest.storage_backend().unwrap() {
            StorageBackend::PostgreSQL(cfg) => {
                assert_eq!(cfg.connection_string, "postgres://aegis:secret@db:5432/aegis");
                assert_eq!(cfg.max_connections, 12);
                assert!(cfg.run_migrations);
            }
            other => panic!("expected postgres backend, got {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        let mut manifest = StoreConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.storage.backend = BackendKind::Postgres;
        assert!(manifest.validate().is_err());
        manifest.spec.storage.connection_string = Some("postgres://localhost/aegis".to_string());
        assert!(manifest.validate().is_ok());

        manifest.spec.logging.format = "xml".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_secret_resolution() {
        assert_eq!(resolve_secret("postgres://x").unwrap(), "postgres://x");
        assert!(resolve_secret("env:AEGIS_MEMORY_TEST_SURELY_UNSET_VAR").is_err());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aegis-memory.yaml");

        let mut manifest = StoreConfigManifest::default();
        manifest.metadata.name = "roundtrip".to_string();
        manifest.spec.search.default_limit = 7;
        manifest.to_yaml_file(&path).unwrap();

        let loaded = StoreConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
        assert_eq!(loaded.spec.search.default_limit, 7);
    }
}
