use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Advisory lock serializing writers of the local store.
///
/// A running TUI and one-shot CLI invocations share the same data directory;
/// each read-modify-write of `todo-db.json` happens under this lock.
///
/// The flock is released when the handle drops. `.lock` is never unlinked, so
/// every waiter locks the same inode.
pub struct StoreLock {
    _file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not lock {path}: another todo process is writing")]
    Timeout { path: PathBuf },
}

/// Interval between lock attempts while another process holds it
const RETRY_EVERY: Duration = Duration::from_millis(10);

impl StoreLock {
    /// Default wait before giving up
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Acquire the lock on `data_dir`, blocking the thread for up to `timeout`.
    pub fn acquire(data_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let (file, path) = open_lock_file(data_dir)?;
        let deadline = Instant::now() + timeout;
        loop {
            if try_lock(&file).is_ok() {
                return Ok(StoreLock { _file: file });
            }
            if Instant::now() >= deadline {
                return Err(LockError::Timeout { path });
            }
            std::thread::sleep(RETRY_EVERY);
        }
    }

    pub fn acquire_default(data_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(data_dir, Self::DEFAULT_TIMEOUT)
    }

    /// Async [`StoreLock::acquire`]: waits on the runtime timer instead of
    /// parking the thread, and stops waiting when the future is dropped.
    pub async fn acquire_async(data_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let (file, path) = open_lock_file(data_dir)?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if try_lock(&file).is_ok() {
                return Ok(StoreLock { _file: file });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LockError::Timeout { path });
            }
            tokio::time::sleep(RETRY_EVERY).await;
        }
    }
}

fn open_lock_file(data_dir: &Path) -> Result<(File, PathBuf), LockError> {
    let path = data_dir.join(".lock");
    let create_err = |source| LockError::Create {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(data_dir).map_err(create_err)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(create_err)?;
    Ok((file, path))
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_release_reacquire() {
        let tmp = TempDir::new().unwrap();
        let lock = StoreLock::acquire_default(tmp.path()).unwrap();
        assert!(tmp.path().join(".lock").exists());
        drop(lock);
        assert!(StoreLock::acquire_default(tmp.path()).is_ok());
        assert!(tmp.path().join(".lock").exists());
    }

    #[cfg(unix)]
    #[test]
    fn contention_times_out() {
        let tmp = TempDir::new().unwrap();
        let _held = StoreLock::acquire_default(tmp.path()).unwrap();
        let second = StoreLock::acquire(tmp.path(), Duration::from_millis(50));
        assert!(matches!(second, Err(LockError::Timeout { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn async_acquire_waits_for_release() {
        let tmp = TempDir::new().unwrap();
        let held = StoreLock::acquire_default(tmp.path()).unwrap();

        let timed_out = StoreLock::acquire_async(tmp.path(), Duration::from_millis(50)).await;
        assert!(matches!(timed_out, Err(LockError::Timeout { .. })));

        let waiter = StoreLock::acquire_async(tmp.path(), Duration::from_secs(2));
        let release = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(held);
        };
        let (got, ()) = tokio::join!(waiter, release);
        assert!(got.is_ok());
    }
}
