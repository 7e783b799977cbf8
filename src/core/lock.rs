//! Per-job advisory lock so only one daily and one weekly run execute at a time.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use super::error::PipelineError;
use crate::domain::JobKind;

/// Exclusive lock on `<locks_dir>/<job>.lock`, released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting.
    ///
    /// Fails with [`PipelineError::AlreadyRunning`] if another process (or
    /// another run in this one) holds it.
    pub fn acquire(locks_dir: &Path, job: JobKind) -> Result<Self, PipelineError> {
        fs::create_dir_all(locks_dir).map_err(|e| {
            PipelineError::Lock(format!(
                "Failed to create lock directory {}: {}",
                locks_dir.display(),
                e
            ))
        })?;

        let path = locks_dir.join(format!("{}.lock", job.as_str()));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| {
                PipelineError::Lock(format!("Failed to open {}: {}", path.display(), e))
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(PipelineError::AlreadyRunning { job, path });
        }

        // Owner pid, for operators inspecting a stuck lock
        if file.set_len(0).is_ok() {
            let _ = writeln!(file, "{}", std::process::id());
        }

        debug!(lock = %path.display(), "Acquired run lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
