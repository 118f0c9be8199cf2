use std::env;
use std::sync::Arc;

use anyhow::{Context, bail};
use indexing_workflow::{AppConfig, IndexingWorkflow, RepositoryInput, WorkflowInput};
use repo_clone_service::EnvTokenProvider;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env when present.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load_from_env_or_default();
    let input = workflow_input_from_env()?;

    let workflow = IndexingWorkflow::new(config, Arc::new(EnvTokenProvider));
    let outcome = workflow
        .run(input, CancellationToken::new())
        .await
        .context("indexing workflow failed")?;

    info!("{outcome}");
    println!("{outcome}");
    Ok(())
}

/// Assemble one workflow request from the process environment.
///
/// Required: `REPO_ID`, `GITHUB_REPO_NAME`, `REPO_URL`. Optional:
/// `DEFAULT_BRANCH` (default `main`), `COMMIT_SHA`, `INSTALLATION_ID`.
fn workflow_input_from_env() -> anyhow::Result<WorkflowInput> {
    let repo_id = require_env("REPO_ID")?;
    let github_repo_name = require_env("GITHUB_REPO_NAME")?;
    let repo_url = require_env("REPO_URL")?;

    let default_branch = env::var("DEFAULT_BRANCH").unwrap_or_else(|_| "main".to_string());
    let commit_sha = env::var("COMMIT_SHA").ok().filter(|s| !s.is_empty());
    let installation_id = env::var("INSTALLATION_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    Ok(WorkflowInput {
        installation_id,
        repository: RepositoryInput {
            repo_id,
            github_repo_name,
            default_branch,
            repo_url,
            commit_sha,
        },
    })
}

fn require_env(key: &str) -> anyhow::Result<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => bail!("missing required environment variable {key}")
    }
}
