use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fs4::FileExt;
use tracing::{debug, warn};

use crate::error::BootstrapError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock on a file, held until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks until the lock is held, polling every 10ms.
    ///
    /// With `timeout` set, gives up once that much time has passed.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be opened or locked, or
    /// [`BootstrapError::LockTimeout`] once the timeout elapses.
    pub fn acquire(path: &Path, timeout: Option<Duration>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lock {}", path.display()))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), "acquired extraction lock");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if is_contended(&err) => {
                    if let Some(limit) = timeout {
                        if started.elapsed() >= limit {
                            return Err(BootstrapError::LockTimeout {
                                path: path.to_path_buf(),
                                waited_secs: limit.as_secs(),
                            }
                            .into());
                        }
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to lock {}", path.display()))
                }
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), %err, "failed to release lock");
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    #[cfg(windows)]
    if matches!(err.raw_os_error(), Some(32 | 33)) {
        return true;
    }
    err.kind() == ErrorKind::WouldBlock
}
