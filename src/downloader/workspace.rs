// Scratch workspace - one private directory per job

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use uuid::Uuid;

use super::errors::DownloadError;

/// Parent directory for all job scratch directories
#[derive(Debug, Clone)]
pub struct ScratchRoot {
    root: PathBuf,
}

impl ScratchRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create `<root>/<uuid>`, readable only by the current user.
    ///
    /// The directory name is generated, never derived from the caller's job id.
    pub async fn create_job_dir(&self, job_id: &str) -> Result<ScratchDir, DownloadError> {
        let path = self.root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(&path, perms).await?;
        }

        tracing::debug!(job_id, path = %path.display(), "created scratch directory");
        Ok(ScratchDir {
            path,
            cleaned: false,
        })
    }

    /// Remove job directories older than `max_age`. Returns how many were removed.
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize, DownloadError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut cleaned = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified < cutoff {
                match fs::remove_dir_all(entry.path()).await {
                    Ok(()) => cleaned += 1,
                    Err(e) => tracing::error!(
                        path = %entry.path().display(),
                        error = %e,
                        "failed to remove stale scratch directory"
                    ),
                }
            }
        }

        if cleaned > 0 {
            tracing::info!(cleaned, "removed stale scratch directories");
        }
        Ok(cleaned)
    }
}

/// A job's scratch directory. Removed on `cleanup` or when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    cleaned: bool,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory. Safe to call more than once.
    pub async fn cleanup(&mut self) -> Result<(), DownloadError> {
        if self.cleaned {
            return Ok(());
        }
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cleaned = true;
        tracing::debug!(path = %self.path.display(), "cleaned scratch directory");
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "scratch cleanup on drop failed");
            }
        }
    }
}
