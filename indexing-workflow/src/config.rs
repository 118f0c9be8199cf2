//! Environment-driven application configuration.
//!
//! Loading is intentionally tolerant: unknown variables are ignored and
//! unparseable values fall back to defaults. A basic validation pass runs
//! after load to ensure sane combinations.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use kg_indexer::graph::repo_builder::RepoGraphOptions;
use repo_clone_service::CloneOptions;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::retry::RetryPolicy;

/// All tunables of the indexing pipeline.
///
/// Supported ENV vars (all optional):
/// - `GRAPH_DB_URI`                dial target (path or `:memory:`)
/// - `GRAPH_DB_DATABASE`           logical database name
/// - `SOFT_FILE_LIMIT_BYTES`       chunked-path threshold
/// - `HARD_FILE_LIMIT_BYTES`       outright skip threshold
/// - `MAX_SYMBOLS_PER_FILE`        per-file truncation point
/// - `TEXT_CHUNK_SIZE` / `TEXT_CHUNK_OVERLAP`
/// - `SYMBOL_BATCH_SIZE`           chunked-extractor yield size
/// - `GC_INTERVAL_BATCHES`         chunked checkpoint interval
/// - `KG_TTL_DAYS`                 cleanup horizon
/// - `RETRY_MAX_ATTEMPTS` / `RETRY_INITIAL_INTERVAL_S` /
///   `RETRY_MAX_INTERVAL_S` / `RETRY_BACKOFF_COEFFICIENT`
/// - `CLONE_TIMEOUT_S` / `MAX_CLONE_SIZE_MB` / `CLONE_TMP_ROOT`
/// - `HEARTBEAT_INTERVAL_S`        liveness interval for long stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub graph_db_uri: String,
    pub graph_db_database: String,
    pub indexer: RepoGraphOptions,
    pub kg_ttl_days: i64,
    pub retry: RetryPolicy,
    pub clone_timeout_s: u64,
    pub max_clone_size_mb: u64,
    pub clone_tmp_root: PathBuf,
    pub heartbeat_interval_s: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            graph_db_uri: "kg.duckdb".to_string(),
            graph_db_database: "kg".to_string(),
            indexer: RepoGraphOptions::default(),
            kg_ttl_days: 30,
            retry: RetryPolicy::default(),
            clone_timeout_s: 300,
            max_clone_size_mb: 1000,
            clone_tmp_root: env::temp_dir(),
            heartbeat_interval_s: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on missing or malformed values.
    pub fn load_from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("GRAPH_DB_URI") {
            cfg.graph_db_uri = v;
        }
        if let Ok(v) = env::var("GRAPH_DB_DATABASE") {
            cfg.graph_db_database = v;
        }

        read_env("SOFT_FILE_LIMIT_BYTES", &mut cfg.indexer.soft_file_limit_bytes);
        read_env("HARD_FILE_LIMIT_BYTES", &mut cfg.indexer.hard_file_limit_bytes);
        read_env("MAX_SYMBOLS_PER_FILE", &mut cfg.indexer.max_symbols_per_file);
        read_env("TEXT_CHUNK_SIZE", &mut cfg.indexer.text_chunk_size);
        read_env("TEXT_CHUNK_OVERLAP", &mut cfg.indexer.text_chunk_overlap);
        read_env("SYMBOL_BATCH_SIZE", &mut cfg.indexer.symbol_batch_size);
        read_env("GC_INTERVAL_BATCHES", &mut cfg.indexer.gc_interval_batches);

        read_env("KG_TTL_DAYS", &mut cfg.kg_ttl_days);

        read_env("RETRY_MAX_ATTEMPTS", &mut cfg.retry.max_attempts);
        read_env("RETRY_INITIAL_INTERVAL_S", &mut cfg.retry.initial_interval_s);
        read_env("RETRY_MAX_INTERVAL_S", &mut cfg.retry.max_interval_s);
        read_env("RETRY_BACKOFF_COEFFICIENT", &mut cfg.retry.backoff_coefficient);

        read_env("CLONE_TIMEOUT_S", &mut cfg.clone_timeout_s);
        read_env("MAX_CLONE_SIZE_MB", &mut cfg.max_clone_size_mb);
        if let Ok(v) = env::var("CLONE_TMP_ROOT") {
            cfg.clone_tmp_root = PathBuf::from(v);
        }
        read_env("HEARTBEAT_INTERVAL_S", &mut cfg.heartbeat_interval_s);

        if let Err(message) = cfg.validate() {
            warn!(message, "invalid configuration value, reverting to defaults");
            return Self::default();
        }
        cfg
    }

    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.indexer.soft_file_limit_bytes >= self.indexer.hard_file_limit_bytes {
            return Err("soft_file_limit_bytes must be below hard_file_limit_bytes");
        }
        if self.indexer.text_chunk_overlap >= self.indexer.text_chunk_size {
            return Err("text_chunk_overlap must be below text_chunk_size");
        }
        if self.retry.max_attempts == 0 {
            return Err("retry_max_attempts must be at least 1");
        }
        if self.retry.backoff_coefficient < 1.0 {
            return Err("retry_backoff_coefficient must be >= 1.0");
        }
        Ok(())
    }

    pub fn clone_options(&self) -> CloneOptions {
        CloneOptions {
            tmp_root: self.clone_tmp_root.clone(),
            clone_timeout: Duration::from_secs(self.clone_timeout_s),
            max_clone_size_mb: self.max_clone_size_mb,
        }
    }
}

fn read_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = raw, "ignoring unparseable configuration value"),
        }
    }
}
