//! Ephemeral workspace allocation and teardown.
//!
//! Each verification session gets exactly one directory under the workspace
//! root. The directory is the only host path bound into the sandbox, and it
//! is removed when the session ends, on every exit path.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::session::SessionId;
use crate::error::WorkspaceError;
use crate::metrics::{self, WorkspaceGauge};

/// Directory name prefix for session workspaces.
const WORKSPACE_PREFIX: &str = "session-";

/// An isolated on-disk staging area owned by one session.
///
/// Dropping a workspace that was never released removes its directory
/// as a last resort (for example when the owning future is cancelled).
#[derive(Debug)]
pub struct Workspace {
    session_id: SessionId,
    path: PathBuf,
    released: AtomicBool,
    gauge: WorkspaceGauge,
}

impl Workspace {
    /// Returns the owning session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the absolute host path of the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the directory is present on disk.
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Writes `content` into a single file inside the workspace.
    ///
    /// Only a bare file name is accepted; anything that could escape the
    /// workspace directory is rejected.
    pub fn write_file(&self, file_name: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        let is_bare = Path::new(file_name)
            .file_name()
            .map(|name| name == file_name)
            .unwrap_or(false);
        if !is_bare {
            return Err(WorkspaceError::WriteFailed {
                path: file_name.to_string(),
                source: std::io::Error::new(
                    ErrorKind::InvalidInput,
                    "file name must not contain path components",
                ),
            });
        }

        let file_path = self.path.join(file_name);
        fs::write(&file_path, content).map_err(|source| WorkspaceError::WriteFailed {
            path: file_path.display().to_string(),
            source,
        })?;
        Ok(file_path)
    }

    /// Marks the workspace released. Returns true on the first call only.
    fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.mark_released() {
            warn!(
                session_id = %self.session_id,
                path = %self.path.display(),
                "Workspace dropped without release, removing"
            );
            self.gauge.close();
            remove_workspace_dir(&self.path, &self.session_id);
        }
    }
}

/// Allocates and tears down per-session workspace directories.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager rooted at `root`. The root is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the configured workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the workspace directory for `session_id`.
    ///
    /// The directory name is derived solely from the server-generated
    /// session id. An existing directory with the same name is treated as a
    /// collision and never reused.
    pub fn acquire(&self, session_id: &SessionId) -> Result<Workspace, WorkspaceError> {
        fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::RootUnavailable {
            path: self.root.display().to_string(),
            source,
        })?;
        // Docker binds need an absolute, symlink-free host path.
        let root = fs::canonicalize(&self.root).map_err(|source| {
            WorkspaceError::RootUnavailable {
                path: self.root.display().to_string(),
                source,
            }
        })?;

        let path = root.join(format!("{}{}", WORKSPACE_PREFIX, session_id));
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision(path.display().to_string()));
            }
            Err(source) => {
                return Err(WorkspaceError::CreateFailed {
                    path: path.display().to_string(),
                    source,
                });
            }
        }

        info!(session_id = %session_id, path = %path.display(), "Workspace acquired");

        Ok(Workspace {
            session_id: session_id.clone(),
            path,
            released: AtomicBool::new(false),
            gauge: metrics::workspace_opened(),
        })
    }

    /// Recursively deletes the workspace directory.
    ///
    /// Idempotent and infallible: a directory that is already gone is a
    /// no-op, and any other failure is logged rather than returned.
    pub fn release(&self, workspace: &Workspace) {
        if workspace.mark_released() {
            workspace.gauge.close();
        }
        remove_workspace_dir(&workspace.path, &workspace.session_id);
    }
}

fn remove_workspace_dir(path: &Path, session_id: &SessionId) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(session_id = %session_id, "Workspace removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(session_id = %session_id, "Workspace already removed")
        }
        Err(e) => warn!(
            session_id = %session_id,
            path = %path.display(),
            error = %e,
            "Failed to remove workspace"
        ),
    }
}
