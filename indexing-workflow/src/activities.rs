//! Workflow activities: plain async functions from inputs to results.
//!
//! Every activity opens and closes its own I/O (store connections, git
//! processes); the driver composes them but holds nothing long-lived.

use std::sync::Arc;

use kg_indexer::{PersistenceStats, RepoGraphBuilder};
use kg_store::{KnowledgeGraphStore, MetadataStore, open_database};
use repo_clone_service::{AccessTokenProvider, CloneRequest, CloneResult, CloneService};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{Result, WorkflowError};
use crate::heartbeat::Heartbeat;
use crate::input::{
    CleanupCloneResult, CleanupStaleResult, ParseActivityResult, PersistMetadataResult,
    WorkflowInput,
};

/// Clone the repository and resolve the commit SHA.
pub async fn clone_repo_activity(
    config: &AppConfig,
    token_provider: &Arc<dyn AccessTokenProvider>,
    input: &WorkflowInput,
    heartbeat: &Heartbeat,
) -> Result<CloneResult> {
    heartbeat.beat("clone_repo", &format!("cloning {}", input.repository.github_repo_name));

    let service = CloneService::new(Arc::clone(token_provider), config.clone_options());
    let request = CloneRequest {
        repo_id: input.repository.repo_id.clone(),
        repo_full_name: input.repository.github_repo_name.clone(),
        installation_id: input.installation_id,
        default_branch: input.repository.default_branch.clone(),
        repo_url: input.repository.repo_url.clone(),
        commit_sha: input.repository.commit_sha.clone(),
    };

    let result = service.clone_repo(&request).await?;
    info!(
        repo = %input.repository.github_repo_name,
        path = %result.local_path,
        sha = %result.commit_sha,
        "clone activity complete"
    );
    Ok(result)
}

/// Parse the checkout with Tree-sitter and build the in-memory graph.
pub async fn parse_repo_activity(
    config: &AppConfig,
    clone: &CloneResult,
    repo_id: &str,
    heartbeat: &Heartbeat,
    cancel: &CancellationToken,
) -> Result<ParseActivityResult> {
    heartbeat.beat("parse_repo", "starting AST parsing");

    if cancel.is_cancelled() {
        return Err(WorkflowError::Cancelled);
    }

    let builder = RepoGraphBuilder::with_options(
        repo_id,
        Some(clone.commit_sha.clone()),
        clone.local_path.clone(),
        config.indexer.clone(),
    );

    // The walk is CPU-bound and synchronous; keep it off the async threads.
    let graph_result = tokio::task::spawn_blocking(move || builder.build())
        .await
        .map_err(|e| WorkflowError::Task(e.to_string()))?
        .map_err(|e| WorkflowError::Parse(e.to_string()))?;

    if cancel.is_cancelled() {
        return Err(WorkflowError::Cancelled);
    }

    heartbeat.beat(
        "parse_repo",
        &format!(
            "parsed {} nodes, {} edges",
            graph_result.nodes.len(),
            graph_result.edges.len()
        ),
    );
    info!(
        repo_id,
        nodes = graph_result.nodes.len(),
        edges = graph_result.edges.len(),
        "parse activity complete"
    );

    Ok(ParseActivityResult {
        stats: graph_result.stats.clone(),
        repo_id: repo_id.to_string(),
        commit_sha: clone.commit_sha.clone(),
        graph_result,
    })
}

/// Write the snapshot record for this indexing run.
pub async fn persist_metadata_activity(
    config: &AppConfig,
    parse: &ParseActivityResult,
) -> Result<PersistMetadataResult> {
    let conn = open_database(&config.graph_db_uri)?;
    let store = MetadataStore::with_connection(conn).await?;

    let snapshot_id = store
        .persist_indexing_metadata(
            &parse.repo_id,
            Some(&parse.commit_sha),
            &parse.graph_result,
            &parse.stats,
        )
        .await?;

    info!(repo_id = %parse.repo_id, snapshot_id, "metadata activity complete");
    Ok(PersistMetadataResult {
        status: "success".to_string(),
        snapshot_id,
    })
}

/// Upsert the graph, nodes then edges.
pub async fn persist_kg_activity(
    config: &AppConfig,
    parse: &ParseActivityResult,
    heartbeat: &Heartbeat,
) -> Result<PersistenceStats> {
    heartbeat.beat("persist_kg", "starting graph persistence");

    let conn = open_database(&config.graph_db_uri)?;
    let store = KnowledgeGraphStore::with_connection(conn).await?;

    let stats = store
        .persist_graph(&parse.repo_id, &parse.graph_result.nodes, &parse.graph_result.edges)
        .await?;

    info!(
        repo_id = %parse.repo_id,
        nodes_created = stats.nodes_created,
        edges_created = stats.edges_created,
        "graph persistence activity complete"
    );
    Ok(stats)
}

/// Delete nodes whose `last_indexed_at` fell outside the TTL window.
pub async fn cleanup_stale_kg_activity(
    config: &AppConfig,
    repo_id: &str,
) -> Result<CleanupStaleResult> {
    let conn = open_database(&config.graph_db_uri)?;
    let store = KnowledgeGraphStore::with_connection(conn).await?;

    let nodes_deleted = store.cleanup_stale_nodes(repo_id, config.kg_ttl_days).await?;
    info!(repo_id, nodes_deleted, "stale cleanup activity complete");
    Ok(CleanupStaleResult { nodes_deleted })
}

/// Best-effort removal of the clone working directory; never fails the
/// workflow.
pub async fn cleanup_clone_activity(
    config: &AppConfig,
    token_provider: &Arc<dyn AccessTokenProvider>,
    local_path: &str,
) -> CleanupCloneResult {
    let service = CloneService::new(Arc::clone(token_provider), config.clone_options());
    match service.cleanup_repo(local_path).await {
        Ok(()) => CleanupCloneResult {
            status: "cleaned".to_string(),
            error: None,
        },
        Err(e) => {
            warn!(local_path, error = %e, "clone cleanup failed");
            CleanupCloneResult {
                status: "cleanup_failed".to_string(),
                error: Some(e.to_string()),
            }
        }
    }
}
