//! Linear stage composition with retry, heartbeats, and cancellation.

use std::sync::Arc;

use repo_clone_service::AccessTokenProvider;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::activities;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::heartbeat::{Heartbeat, HeartbeatStatus};
use crate::input::WorkflowInput;

/// Drives one `(repo_id, commit)` indexing request through all stages.
pub struct IndexingWorkflow {
    config: AppConfig,
    token_provider: Arc<dyn AccessTokenProvider>,
    heartbeat: Heartbeat,
    heartbeat_rx: watch::Receiver<HeartbeatStatus>,
}

impl IndexingWorkflow {
    pub fn new(config: AppConfig, token_provider: Arc<dyn AccessTokenProvider>) -> Self {
        let (heartbeat, heartbeat_rx) = Heartbeat::new();
        Self {
            config,
            token_provider,
            heartbeat,
            heartbeat_rx,
        }
    }

    /// Observe the activities' liveness signals.
    pub fn heartbeat_receiver(&self) -> watch::Receiver<HeartbeatStatus> {
        self.heartbeat_rx.clone()
    }

    /// Run the pipeline to completion.
    ///
    /// Stages run sequentially; retryable failures go through the backoff
    /// policy, non-retryable ones abort immediately. Clone cleanup at the
    /// end is best-effort and cannot fail the workflow.
    #[instrument(skip_all, fields(repo = %input.repository.github_repo_name))]
    pub async fn run(&self, input: WorkflowInput, cancel: CancellationToken) -> Result<String> {
        let retry = self.config.retry.clone();

        let clone_result = retry
            .run("clone_repo", &cancel, || {
                activities::clone_repo_activity(
                    &self.config,
                    &self.token_provider,
                    &input,
                    &self.heartbeat,
                )
            })
            .await?;

        let parse_result = retry
            .run("parse_repo", &cancel, || {
                activities::parse_repo_activity(
                    &self.config,
                    &clone_result,
                    &input.repository.repo_id,
                    &self.heartbeat,
                    &cancel,
                )
            })
            .await?;

        let metadata = retry
            .run("persist_metadata", &cancel, || {
                activities::persist_metadata_activity(&self.config, &parse_result)
            })
            .await?;
        info!(snapshot_id = %metadata.snapshot_id, "snapshot recorded");

        let persistence = retry
            .run("persist_kg", &cancel, || {
                activities::persist_kg_activity(&self.config, &parse_result, &self.heartbeat)
            })
            .await?;
        info!(
            nodes_created = persistence.nodes_created,
            nodes_updated = persistence.nodes_updated,
            "graph persisted"
        );

        let stale = retry
            .run("cleanup_stale_kg", &cancel, || {
                activities::cleanup_stale_kg_activity(&self.config, &input.repository.repo_id)
            })
            .await?;
        info!(nodes_deleted = stale.nodes_deleted, "stale nodes cleaned up");

        let cleanup = activities::cleanup_clone_activity(
            &self.config,
            &self.token_provider,
            &clone_result.local_path,
        )
        .await;
        if cleanup.status != "cleaned" {
            warn!(status = %cleanup.status, "clone cleanup did not complete");
        }

        Ok(format!(
            "Repo {} indexed successfully",
            input.repository.github_repo_name
        ))
    }
}
