//! Data-directory ownership: one engine instance per shard directory.
//!
//! The `LOCK` file is held with an exclusive advisory lock, so a SIGKILLed
//! shard releases it automatically and restarts cleanly, while a concurrent
//! second open fails fast with `Conflict`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use kura_core::error::{Error, Result};

pub const LOCK_FILE_NAME: &str = "LOCK";

/// Guard over the shard directory; the lock is released on drop.
pub struct Lockfile {
    path: PathBuf,
    file: File,
}

impl Lockfile {
    /// Acquire the directory lock, failing fast if another process holds it.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::io(format!("creating data directory {}", dir.display()), e))?;

        let path = dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(format!("opening lockfile {}", path.display()), e))?;

        file.try_lock_exclusive().map_err(|_| Error::Conflict {
            path: path.clone(),
        })?;

        // Pid is diagnostic only; ownership is the advisory lock.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());

        debug!(path = %path.display(), "acquired data directory lock");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), "failed to unlock lockfile: {e}");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "failed to remove lockfile: {e}");
        }
    }
}
