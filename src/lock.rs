//! PID-file based named exclusion locks (spec.md §4.4). New module: the
//! teacher is a one-shot CLI tool with no locking subsystem of its own, so
//! this is grounded on its error-handling idiom instead (`thiserror` enums
//! with one variant per failure mode) and on `nix::sys::signal::kill` with
//! signal `None`, a liveness probe that sends no actual signal.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock '{name}' is held by running process {pid}")]
    Held { name: String, pid: i32 },
    #[error("lock '{name}' file exists but owner pid {pid} is not running; remove {path} to clear it")]
    Stale { name: String, pid: i32, path: PathBuf },
    #[error("could not read lock file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write lock file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("lock file {path} does not contain a valid pid")]
    Corrupt { path: PathBuf },
}

/// True iff a process with pid `pid` currently exists, probed via
/// `kill(pid, None)` which performs no actual signal delivery.
fn pid_is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None).is_ok()
}

/// An acquired named lock. Releases (deletes the lock file) on drop,
/// covering early returns, `?`, and panics — spec.md §4.4's "guaranteed
/// release on every exit path."
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Acquire the named lock under `dir` (a `{name}.lock` file holding the
/// caller's own pid). If the file exists and its recorded pid is alive,
/// returns [`LockError::Held`]; if the pid is dead, returns
/// [`LockError::Stale`] — the lock is never stolen automatically, the
/// operator must remove the file.
pub fn acquire(dir: &Path, name: &str) -> Result<LockGuard, LockError> {
    let path = dir.join(format!("{name}.lock"));
    if let Ok(contents) = fs::read_to_string(&path) {
        let pid: i32 = contents
            .trim()
            .parse()
            .map_err(|_| LockError::Corrupt { path: path.clone() })?;
        if pid_is_alive(pid) {
            return Err(LockError::Held { name: name.to_string(), pid });
        }
        return Err(LockError::Stale { name: name.to_string(), pid, path });
    }
    let mut file = fs::File::create(&path).map_err(|e| LockError::Write { path: path.clone(), source: e })?;
    write!(file, "{}", std::process::id()).map_err(|e| LockError::Write { path: path.clone(), source: e })?;
    Ok(LockGuard { path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let guard = acquire(dir.path(), "snapshot").unwrap();
        let lock_path = guard.path().to_path_buf();
        assert!(lock_path.exists());
        drop(guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn second_acquire_with_live_pid_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let _guard = acquire(dir.path(), "send").unwrap();
        // The lock file now records this test process's own pid, which is
        // alive, so a second acquire must report Held.
        match acquire(dir.path(), "send") {
            Err(LockError::Held { pid, .. }) => assert_eq!(pid, std::process::id() as i32),
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.lock");
        // pid 1 might be alive on a real system but a very large,
        // implausible pid is reliably dead.
        std::fs::write(&path, "2147480000").unwrap();
        match acquire(dir.path(), "snapshot") {
            Err(LockError::Stale { pid, .. }) => assert_eq!(pid, 2147480000),
            other => panic!("expected Stale, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_lock_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("send.lock"), "not-a-pid").unwrap();
        assert!(matches!(acquire(dir.path(), "send"), Err(LockError::Corrupt { .. })));
    }
}
