//! Snapshot metadata records for indexing runs.
//!
//! The graph itself lives in `kg_nodes`/`kg_edges`; this store keeps the
//! relational bookkeeping: one `repo_snapshots` row per indexing run and the
//! repository's `last_indexed_at` timestamp.

use chrono::Utc;
use duckdb::{Connection, params};
use kg_indexer::{IndexingStats, RepoGraphResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::SharedConnection;

/// Deterministic snapshot id: UUID v5 over the run's logical key, so the
/// same `(repo_id, commit_sha, created_at)` always names the same snapshot.
fn snapshot_id(repo_id: &str, commit_sha: Option<&str>, created_at: i64) -> String {
    let key = format!(
        "snapshot|{}|{}|{}",
        repo_id,
        commit_sha.unwrap_or(""),
        created_at
    );
    Uuid::new_v5(&Uuid::nil(), key.as_bytes()).to_string()
}

/// One recorded indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: String,
    pub repository_id: String,
    pub commit_sha: Option<String>,
    /// Micros since epoch.
    pub created_at: i64,
    pub nodes_count: i64,
    pub edges_count: i64,
}

pub struct MetadataStore {
    conn: SharedConnection,
}

impl MetadataStore {
    pub async fn with_connection(conn: SharedConnection) -> Result<Self> {
        {
            let guard = conn.lock().await;
            Self::initialize_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS repo_snapshots (
                id TEXT PRIMARY KEY,
                repository_id TEXT NOT NULL,
                commit_sha TEXT,
                created_at BIGINT NOT NULL,
                nodes_count BIGINT NOT NULL,
                edges_count BIGINT NOT NULL,
                indexed_files BIGINT NOT NULL,
                failed_files BIGINT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_repo_snapshots_repo
            ON repo_snapshots(repository_id);

            CREATE TABLE IF NOT EXISTS repositories (
                id TEXT PRIMARY KEY,
                last_indexed_at BIGINT
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(format!("failed to initialize metadata schema: {e}")))?;

        debug!("metadata schema initialized");
        Ok(())
    }

    /// Record one indexing run and refresh the repository timestamp.
    ///
    /// Returns the snapshot id, derived deterministically from
    /// `(repo_id, commit_sha, created_at)`.
    pub async fn persist_indexing_metadata(
        &self,
        repo_id: &str,
        commit_sha: Option<&str>,
        graph_result: &RepoGraphResult,
        stats: &IndexingStats,
    ) -> Result<String> {
        let now = Utc::now().timestamp_micros();
        let snapshot_id = snapshot_id(repo_id, commit_sha, now);

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO repo_snapshots (
                id, repository_id, commit_sha, created_at,
                nodes_count, edges_count, indexed_files, failed_files
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                snapshot_id,
                repo_id,
                commit_sha,
                now,
                graph_result.nodes.len() as i64,
                graph_result.edges.len() as i64,
                stats.indexed_files as i64,
                stats.failed_files as i64,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("failed to insert snapshot: {e}")))?;

        conn.execute(
            r#"INSERT INTO repositories (id, last_indexed_at) VALUES (?, ?)
               ON CONFLICT (id) DO UPDATE SET last_indexed_at = excluded.last_indexed_at"#,
            params![repo_id, now],
        )
        .map_err(|e| StoreError::Storage(format!("failed to update repository row: {e}")))?;

        info!(repo_id, snapshot_id, "recorded indexing snapshot");
        Ok(snapshot_id)
    }

    /// Most recent snapshot for a repository, if any run was recorded.
    pub async fn latest_snapshot(&self, repo_id: &str) -> Result<Option<SnapshotRecord>> {
        let conn = self.conn.lock().await;
        match conn.query_row(
            r#"SELECT id, repository_id, commit_sha, created_at, nodes_count, edges_count
               FROM repo_snapshots
               WHERE repository_id = ?
               ORDER BY created_at DESC
               LIMIT 1"#,
            params![repo_id],
            |row| {
                Ok(SnapshotRecord {
                    id: row.get(0)?,
                    repository_id: row.get(1)?,
                    commit_sha: row.get(2)?,
                    created_at: row.get(3)?,
                    nodes_count: row.get(4)?,
                    edges_count: row.get(5)?,
                })
            },
        ) {
            Ok(record) => Ok(Some(record)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Storage(format!(
                "failed to read latest snapshot: {e}"
            ))),
        }
    }

    /// Repository `last_indexed_at`, micros since epoch.
    pub async fn repository_last_indexed_at(&self, repo_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        match conn.query_row(
            "SELECT last_indexed_at FROM repositories WHERE id = ?",
            params![repo_id],
            |row| row.get::<_, Option<i64>>(0),
        ) {
            Ok(ts) => Ok(ts),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Storage(format!(
                "failed to read repository row: {e}"
            ))),
        }
    }
}
