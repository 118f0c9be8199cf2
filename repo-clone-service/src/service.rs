//! The clone service proper.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::askpass::AskpassScript;
use crate::errors::{CloneError, Result, classify_git_failure};
use crate::AccessTokenProvider;

/// Tunables for the clone stage.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Parent directory for clone working directories.
    pub tmp_root: PathBuf,
    pub clone_timeout: Duration,
    pub max_clone_size_mb: u64,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            tmp_root: std::env::temp_dir(),
            clone_timeout: Duration::from_secs(300),
            max_clone_size_mb: 1000,
        }
    }
}

/// What to clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRequest {
    pub repo_id: String,
    /// `owner/repo` form, used to derive the URL when none is given.
    pub repo_full_name: String,
    pub installation_id: i64,
    pub default_branch: String,
    pub repo_url: String,
    /// When absent, the branch ref is resolved remotely.
    pub commit_sha: Option<String>,
}

/// Where the checkout landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneResult {
    pub local_path: String,
    pub commit_sha: String,
}

/// Clones repositories at exact commits with token auth.
pub struct CloneService {
    token_provider: Arc<dyn AccessTokenProvider>,
    options: CloneOptions,
}

impl CloneService {
    pub fn new(token_provider: Arc<dyn AccessTokenProvider>, options: CloneOptions) -> Self {
        Self {
            token_provider,
            options,
        }
    }

    /// Clone the requested commit into `<tmp>/<repo_id>-<sha>`.
    ///
    /// An existing directory at that path is reused as-is (a concurrent or
    /// earlier run already staged it). Fresh clones go through a
    /// `.tmp-<pid>` staging directory and are renamed into place only after
    /// the HEAD SHA and size checks pass.
    #[instrument(skip_all, fields(repo = %request.repo_full_name))]
    pub async fn clone_repo(&self, request: &CloneRequest) -> Result<CloneResult> {
        let token = self.token_provider.mint(request.installation_id).await?;
        let repo_url = self.effective_url(request);

        let commit_sha = match &request.commit_sha {
            Some(sha) => {
                if !is_valid_sha(sha) {
                    return Err(CloneError::InvalidSha(sha.clone()));
                }
                sha.clone()
            }
            None => {
                self.resolve_commit_sha(&repo_url, &request.default_branch, &token)
                    .await?
            }
        };

        let local_path = self
            .options
            .tmp_root
            .join(format!("{}-{}", request.repo_id, commit_sha));

        if local_path.exists() {
            info!(path = %local_path.display(), "reusing existing clone");
            return Ok(CloneResult {
                local_path: local_path.to_string_lossy().into_owned(),
                commit_sha,
            });
        }

        let temp_path = PathBuf::from(format!(
            "{}.tmp-{}",
            local_path.to_string_lossy(),
            std::process::id()
        ));

        let staged = self
            .stage_clone(&repo_url, &commit_sha, &temp_path, &token)
            .await;
        if let Err(e) = staged {
            if temp_path.exists() {
                let _ = std::fs::remove_dir_all(&temp_path);
            }
            return Err(e);
        }

        tokio::fs::rename(&temp_path, &local_path).await?;
        info!(path = %local_path.display(), sha = %commit_sha, "clone complete");

        Ok(CloneResult {
            local_path: local_path.to_string_lossy().into_owned(),
            commit_sha,
        })
    }

    /// Best-effort removal of a clone working directory.
    pub async fn cleanup_repo(&self, local_path: &str) -> Result<()> {
        let path = Path::new(local_path);
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
            debug!(path = local_path, "removed clone directory");
        }
        Ok(())
    }

    async fn stage_clone(
        &self,
        repo_url: &str,
        commit_sha: &str,
        temp_path: &Path,
        token: &str,
    ) -> Result<()> {
        let askpass = AskpassScript::create(token)?;

        self.run_git(&["init", &temp_path.to_string_lossy()], None, &askpass)
            .await?;
        self.run_git(
            &["remote", "add", "origin", repo_url],
            Some(temp_path),
            &askpass,
        )
        .await?;

        // The shallow fetch is the long pole; the stage timeout rides on it.
        let fetch_args = ["fetch", "--depth", "1", "origin", commit_sha];
        let fetch = self.run_git(&fetch_args, Some(temp_path), &askpass);
        match timeout(self.options.clone_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CloneError::Retryable(format!(
                    "git fetch timed out after {:?}",
                    self.options.clone_timeout
                )));
            }
        };

        self.run_git(&["checkout", "--detach", commit_sha], Some(temp_path), &askpass)
            .await?;

        self.validate_clone_integrity(temp_path, commit_sha, &askpass)
            .await?;
        self.validate_resource_usage(temp_path)?;
        Ok(())
    }

    /// Re-read HEAD and compare against the requested commit.
    async fn validate_clone_integrity(
        &self,
        path: &Path,
        expected_sha: &str,
        askpass: &AskpassScript,
    ) -> Result<()> {
        let actual = self
            .run_git(&["rev-parse", "HEAD"], Some(path), askpass)
            .await?;
        let actual = actual.trim();

        if actual != expected_sha {
            return Err(CloneError::ShaValidation {
                expected: expected_sha.to_string(),
                actual: actual.to_string(),
            });
        }
        debug!(sha = actual, "sha validation passed");
        Ok(())
    }

    fn validate_resource_usage(&self, path: &Path) -> Result<()> {
        let size_bytes = directory_size(path);
        let size_mb = size_bytes / (1024 * 1024);
        if size_mb > self.options.max_clone_size_mb {
            return Err(CloneError::ResourceExhausted {
                size_mb,
                limit_mb: self.options.max_clone_size_mb,
            });
        }
        debug!(size_bytes, "clone size within limits");
        Ok(())
    }

    /// `git ls-remote` the branch ref and take the SHA column.
    async fn resolve_commit_sha(
        &self,
        repo_url: &str,
        branch: &str,
        token: &str,
    ) -> Result<String> {
        let askpass = AskpassScript::create(token)?;
        let output = self
            .run_git(
                &["ls-remote", repo_url, &format!("refs/heads/{branch}")],
                None,
                &askpass,
            )
            .await?;

        let line = output.trim();
        if line.is_empty() {
            return Err(CloneError::NonRetryable(format!(
                "branch {branch} not found on remote"
            )));
        }

        let sha = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        if !is_valid_sha(&sha) {
            return Err(CloneError::Retryable(format!(
                "unexpected ls-remote output: {line}"
            )));
        }
        Ok(sha)
    }

    async fn run_git(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        askpass: &AskpassScript,
    ) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .env("GIT_ASKPASS", askpass.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!(command = ?args, "running git");
        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(command = ?args, stderr = %stderr, "git command failed");
            return Err(classify_git_failure(&format!("git {}", args.join(" ")), &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn effective_url(&self, request: &CloneRequest) -> String {
        if request.repo_url.is_empty() {
            format!("https://github.com/{}.git", request.repo_full_name)
        } else {
            request.repo_url.clone()
        }
    }
}

/// A clone working directory removed on drop unless kept.
///
/// Used where a checkout must not outlive its scope even on error paths;
/// the workflow's explicit cleanup stage covers the happy path.
pub struct TempClone {
    path: PathBuf,
    keep: bool,
}

impl TempClone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand the path to the caller.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for TempClone {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove clone directory");
        }
    }
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

fn is_valid_sha(sha: &str) -> bool {
    sha.len() == 40 && sha.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticTokenProvider;
    use std::fs;

    fn service(tmp_root: &Path) -> CloneService {
        CloneService::new(
            Arc::new(StaticTokenProvider("tok".to_string())),
            CloneOptions {
                tmp_root: tmp_root.to_path_buf(),
                clone_timeout: Duration::from_secs(5),
                max_clone_size_mb: 1000,
            },
        )
    }

    #[test]
    fn sha_format_is_validated() {
        assert!(is_valid_sha(&"a".repeat(40)));
        assert!(!is_valid_sha("abc123"));
        assert!(!is_valid_sha(&"g".repeat(40)));
    }

    #[tokio::test]
    async fn malformed_sha_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let request = CloneRequest {
            repo_id: "r1".into(),
            repo_full_name: "owner/repo".into(),
            installation_id: 1,
            default_branch: "main".into(),
            repo_url: "https://example.invalid/repo.git".into(),
            commit_sha: Some("not-a-sha".into()),
        };

        let err = svc.clone_repo(&request).await.unwrap_err();
        assert!(matches!(err, CloneError::InvalidSha(_)));
    }

    #[tokio::test]
    async fn existing_clone_directory_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let sha = "a".repeat(40);

        let existing = dir.path().join(format!("r1-{sha}"));
        fs::create_dir_all(&existing).unwrap();

        let request = CloneRequest {
            repo_id: "r1".into(),
            repo_full_name: "owner/repo".into(),
            installation_id: 1,
            default_branch: "main".into(),
            repo_url: "https://example.invalid/repo.git".into(),
            commit_sha: Some(sha.clone()),
        };

        let result = svc.clone_repo(&request).await.unwrap();
        assert_eq!(result.commit_sha, sha);
        assert_eq!(result.local_path, existing.to_string_lossy());
    }

    #[tokio::test]
    async fn cleanup_removes_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let clone_dir = dir.path().join("r1-abc");
        fs::create_dir_all(clone_dir.join("sub")).unwrap();
        fs::write(clone_dir.join("sub/file.txt"), "x").unwrap();

        svc.cleanup_repo(&clone_dir.to_string_lossy()).await.unwrap();
        assert!(!clone_dir.exists());
    }

    #[test]
    fn temp_clone_guard_removes_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        drop(TempClone::new(&a));
        assert!(!a.exists());

        let guard = TempClone::new(&b);
        let kept = guard.keep();
        assert!(kept.exists());
    }

    #[test]
    fn directory_size_sums_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.bin"), vec![0u8; 50]).unwrap();

        assert_eq!(directory_size(dir.path()), 150);
    }
}
