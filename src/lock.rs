//! Single-instance worker lock.
//!
//! The lock is a PID file. A file naming a live process means another worker
//! owns the queue; a missing, unreadable, or stale file is taken over.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    error::{RelayError, Result},
    internal, persist,
};

/// Liveness check for a process id
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by `kill(pid, 0)`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProbe;

impl ProcessProbe for OsProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }

        // SAFETY: signal 0 performs the permission and existence checks only,
        // nothing is delivered to the target.
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }

        // EPERM means the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

/// Result of trying to take the lock
#[derive(Debug)]
pub enum LockOutcome {
    Acquired(WorkerLock),
    /// Another live process holds the lock
    AlreadyRunning(u32),
}

/// Ownership of the PID file; released on drop
#[derive(Debug)]
pub struct WorkerLock {
    path: PathBuf,
    pid: u32,
    released: AtomicBool,
}

impl WorkerLock {
    /// Take the lock for the current process unless a live owner exists.
    ///
    /// # Errors
    /// If the PID file cannot be written
    pub fn acquire(path: impl Into<PathBuf>, probe: &impl ProcessProbe) -> Result<LockOutcome> {
        let path = path.into();

        if let Some(owner) = read_owner(&path)
            && owner != std::process::id()
            && probe.is_alive(owner)
        {
            return Ok(LockOutcome::AlreadyRunning(owner));
        }

        let pid = std::process::id();
        write_pid(&path, pid)?;

        internal!(level = DEBUG, "Acquired worker lock {} for pid {pid}", path.display());

        Ok(LockOutcome::Acquired(Self {
            path,
            pid,
            released: AtomicBool::new(false),
        }))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the PID file.
    ///
    /// Runs at most once; later calls, a file that is already gone, or a file
    /// that now names a different process are all silently accepted.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        if read_owner(&self.path) != Some(self.pid) {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => internal!(level = DEBUG, "Released worker lock {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Unable to remove worker lock {}: {e}",
                self.path.display()
            ),
        }
    }
}

impl Drop for WorkerLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// PID recorded in the lock file, `None` when absent or corrupt
fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
}

fn write_pid(path: &Path, pid: u32) -> Result<()> {
    persist::write_private(path, pid.to_string().as_bytes())
        .map_err(|e| RelayError::fs(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dead;

    impl ProcessProbe for Dead {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    struct Alive;

    impl ProcessProbe for Alive {
        fn is_alive(&self, _pid: u32) -> bool {
            true
        }
    }

    fn acquired(outcome: LockOutcome) -> WorkerLock {
        match outcome {
            LockOutcome::Acquired(lock) => lock,
            LockOutcome::AlreadyRunning(pid) => panic!("lock held by {pid}"),
        }
    }

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");

        let lock = acquired(WorkerLock::acquire(&path, &OsProbe).unwrap());

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
        assert_eq!(lock.pid(), std::process::id());
    }

    #[test]
    fn test_lock_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");

        let _lock = acquired(WorkerLock::acquire(&path, &OsProbe).unwrap());

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "lock mode was {mode:o}");
    }

    #[test]
    fn test_live_owner_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");
        std::fs::write(&path, "4242").unwrap();

        let outcome = WorkerLock::acquire(&path, &Alive).unwrap();

        assert!(matches!(outcome, LockOutcome::AlreadyRunning(4242)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242");
    }

    #[test]
    fn test_stale_owner_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");
        std::fs::write(&path, "4242").unwrap();

        let _lock = acquired(WorkerLock::acquire(&path, &Dead).unwrap());

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_corrupt_lock_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");

        for content in ["", "not a pid", "-12", "0"] {
            std::fs::write(&path, content).unwrap();
            let lock = acquired(WorkerLock::acquire(&path, &Alive).unwrap());
            lock.release();
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");
        let lock = acquired(WorkerLock::acquire(&path, &OsProbe).unwrap());

        lock.release();
        lock.release();
        drop(lock);

        assert!(!path.exists());
    }

    #[test]
    fn test_release_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");
        let lock = acquired(WorkerLock::acquire(&path, &OsProbe).unwrap());

        std::fs::remove_file(&path).unwrap();
        lock.release();

        assert!(!path.exists());
    }

    #[test]
    fn test_release_leaves_foreign_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");
        let lock = acquired(WorkerLock::acquire(&path, &OsProbe).unwrap());

        std::fs::write(&path, "4242").unwrap();
        drop(lock);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242");
    }

    #[test]
    fn test_os_probe() {
        assert!(OsProbe.is_alive(std::process::id()));
        assert!(!OsProbe.is_alive(0));
        assert!(!OsProbe.is_alive(u32::MAX));
        // Above the kernel's PID_MAX_LIMIT of 2^22
        assert!(!OsProbe.is_alive(999_999_999));
    }
}
