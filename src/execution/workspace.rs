//! Per-run working directories
//!
//! Every run owns its directory exclusively for as long as the `Workspace`
//! is alive. Directories are never removed so a failed run can be inspected.

use crate::core::PipelineError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Marker file held by the run that owns a directory
pub const LOCK_FILE: &str = ".pushdeploy.lock";

/// An exclusively held working directory
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    lock: PathBuf,
}

impl Workspace {
    /// Create a fresh directory `<root>/<run_id>`
    ///
    /// Fails if the directory already exists.
    pub fn allocate(root: &Path, run_id: Uuid) -> Result<Self, PipelineError> {
        fs::create_dir_all(root).map_err(|e| {
            PipelineError::Workspace(format!("cannot create {}: {}", root.display(), e))
        })?;

        let path = root.join(run_id.to_string());
        fs::create_dir(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                PipelineError::Workspace(format!("{} already exists", path.display()))
            }
            _ => PipelineError::Workspace(format!("cannot create {}: {}", path.display(), e)),
        })?;

        Self::lock(path)
    }

    /// Take exclusive ownership of an existing (or new) directory
    ///
    /// Fails if another run currently holds it.
    pub fn claim(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = dir.into();
        fs::create_dir_all(&path).map_err(|e| {
            PipelineError::Workspace(format!("cannot create {}: {}", path.display(), e))
        })?;
        Self::lock(path)
    }

    fn lock(path: PathBuf) -> Result<Self, PipelineError> {
        let lock = path.join(LOCK_FILE);
        match Self::create_lock(&path, &lock) {
            Err(LockError::Held) if Self::clear_stale_lock(&lock) => {
                Self::create_lock(&path, &lock).map_err(|e| e.into_pipeline_error(&path))?
            }
            result => result.map_err(|e| e.into_pipeline_error(&path))?,
        }

        debug!("Claimed workspace {}", path.display());
        Ok(Self { path, lock })
    }

    fn create_lock(path: &Path, lock: &Path) -> Result<(), LockError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => LockError::Held,
                _ => LockError::Io(format!("cannot lock {}: {}", path.display(), e)),
            })?;

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Failed to write lock file {}: {}", lock.display(), e);
        }
        Ok(())
    }

    /// Remove a lock whose recorded owner is no longer running
    ///
    /// A lock without a readable pid is treated as held.
    fn clear_stale_lock(lock: &Path) -> bool {
        let Some(pid) = fs::read_to_string(lock)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok())
        else {
            return false;
        };
        if process_alive(pid) {
            return false;
        }

        warn!("Removing stale lock {} left by process {}", lock.display(), pid);
        match fs::remove_file(lock) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                warn!("Failed to remove stale lock {}: {}", lock.display(), e);
                false
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

enum LockError {
    Held,
    Io(String),
}

impl LockError {
    fn into_pipeline_error(self, path: &Path) -> PipelineError {
        match self {
            LockError::Held => {
                PipelineError::Workspace(format!("{} is in use by another run", path.display()))
            }
            LockError::Io(message) => PipelineError::Workspace(message),
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks that the process exists
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock) {
            warn!("Failed to release workspace lock {}: {}", self.lock.display(), e);
        }
    }
}
