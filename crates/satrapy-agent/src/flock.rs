//! Host-scoped exclusion via advisory file locks.
//!
//! Each long-running singleton in the agent (heartbeat, sync,
//! registration) is gated by a non-blocking `flock` on a fixed path. If
//! another local process already holds the lock, the loop simply is not
//! started. The lock is released when the file handle closes, at the
//! latest on process exit. This guards against double-start on one
//! host; it is not distributed consensus.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A non-blocking advisory lock on a fixed path.
#[derive(Debug)]
pub struct Flock {
    path: PathBuf,
    file: Option<File>,
}

impl Flock {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when another process holds the lock, or the
    /// underlying I/O error.
    pub fn try_lock(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "lock already acquired",
            ));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        lock_exclusive_nonblocking(&file)?;

        // Record the holder for operators poking at /tmp.
        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        self.file = Some(file);
        Ok(())
    }

    /// Release the lock by closing the handle.
    pub fn unlock(&mut self) {
        self.file = None;
    }

    /// Whether this instance holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive_nonblocking(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: flock operates on a file descriptor we own for the
    // duration of the call; LOCK_EX | LOCK_NB never blocks.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn lock_exclusive_nonblocking(_file: &File) -> io::Result<()> {
    Ok(())
}
