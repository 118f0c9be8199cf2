//! Git cloning of exact commits into isolated working directories.
//!
//! The service drives the system `git` binary through `tokio::process`:
//! init, remote add, shallow fetch of one SHA, detached checkout.
//! Authentication never touches the URL; a short-lived askpass helper
//! script (mode 0700, deleted afterwards) feeds the token to git. Clones
//! are staged into a `.tmp-<pid>` directory and renamed into place only
//! after SHA and size validation.

pub mod errors;
mod askpass;
pub mod service;

use async_trait::async_trait;

pub use errors::{CloneError, Result};
pub use service::{CloneOptions, CloneRequest, CloneResult, CloneService, TempClone};

/// Mints short-lived access tokens for the source host.
///
/// The concrete minting flow (GitHub App installation tokens and the like)
/// lives outside this crate; the service only consumes the callable.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn mint(&self, installation_id: i64) -> Result<String>;
}

/// Token provider backed by the `GIT_ACCESS_TOKEN` environment variable.
///
/// Suitable for local runs and tests; production wires a real provider.
pub struct EnvTokenProvider;

#[async_trait]
impl AccessTokenProvider for EnvTokenProvider {
    async fn mint(&self, _installation_id: i64) -> Result<String> {
        std::env::var("GIT_ACCESS_TOKEN")
            .map_err(|_| CloneError::NonRetryable("GIT_ACCESS_TOKEN is not set".to_string()))
    }
}

/// Fixed-token provider for tests.
pub struct StaticTokenProvider(pub String);

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn mint(&self, _installation_id: i64) -> Result<String> {
        Ok(self.0.clone())
    }
}
