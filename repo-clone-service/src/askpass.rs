//! Short-lived GIT_ASKPASS helper scripts.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing::warn;

use crate::errors::Result;

/// A credential script on disk, removed when the guard drops.
///
/// The script echoes `x-access-token:<token>` to whatever prompt git issues;
/// the token therefore never appears in a remote URL or process argument
/// list.
pub(crate) struct AskpassScript {
    path: PathBuf,
}

impl AskpassScript {
    pub(crate) fn create(token: &str) -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "askpass-{}-{:x}.sh",
            process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        ));

        fs::write(&path, format!("#!/bin/sh\necho \"x-access-token:{token}\"\n"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AskpassScript {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove askpass script");
        }
    }
}
