//! Workflow input and activity result shapes.

use kg_indexer::{IndexingStats, RepoGraphResult};
use serde::{Deserialize, Serialize};

/// Repository half of a workflow request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryInput {
    pub repo_id: String,
    pub github_repo_name: String,
    pub default_branch: String,
    pub repo_url: String,
    /// When absent, the default branch ref is resolved to a SHA at clone
    /// time.
    #[serde(default)]
    pub commit_sha: Option<String>,
}

/// One indexing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub installation_id: i64,
    pub repository: RepositoryInput,
}

/// Result of the parse stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseActivityResult {
    pub graph_result: RepoGraphResult,
    pub stats: IndexingStats,
    pub repo_id: String,
    pub commit_sha: String,
}

/// Result of the metadata persistence stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistMetadataResult {
    pub status: String,
    pub snapshot_id: String,
}

/// Result of the stale-node cleanup stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupStaleResult {
    pub nodes_deleted: usize,
}

/// Result of the best-effort clone cleanup stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupCloneResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
