//! Scratch workspaces.
//!
//! Every compile-and-run cycle gets its own freshly created directory.
//! Unlike a [`tempfile::TempDir`], a [`WorkspaceHandle`] does not clean up
//! when dropped: the session decides when a workspace dies, so the
//! directory is released from `tempfile`'s guard right after creation and
//! removed explicitly with [`ScratchWorkspace::destroy`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name prefix of scratch directories unless configured otherwise
pub const DEFAULT_PREFIX: &str = "conception-";

/// Workspace lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to create scratch workspace in '{}': {source}", .root.display())]
    Create {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to delete scratch workspace '{}': {source}", .path.display())]
    Destroy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A live scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceHandle {
    path: PathBuf,
}

impl WorkspaceHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates and destroys scratch directories.
#[derive(Debug, Clone)]
pub struct ScratchWorkspace {
    prefix: String,
    root: Option<PathBuf>,
}

impl ScratchWorkspace {
    /// Workspaces named `conception-*` in the system temp directory.
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            root: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Create workspaces under `root` instead of the system temp directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Allocate a fresh, uniquely named, empty directory.
    pub fn create(&self) -> Result<WorkspaceHandle, WorkspaceError> {
        let root = self.root.clone().unwrap_or_else(std::env::temp_dir);
        let create_err = |source| WorkspaceError::Create {
            root: root.clone(),
            source,
        };

        fs::create_dir_all(&root).map_err(create_err)?;
        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir_in(&root)
            .map_err(create_err)?;
        let path = dir.keep();

        tracing::debug!("created scratch workspace {}", path.display());
        Ok(WorkspaceHandle { path })
    }

    /// Recursively delete the workspace, if any.
    ///
    /// A directory that is already gone counts as destroyed.
    pub fn destroy(&self, handle: Option<&WorkspaceHandle>) -> Result<(), WorkspaceError> {
        let Some(handle) = handle else {
            return Ok(());
        };
        match fs::remove_dir_all(&handle.path) {
            Ok(()) => {
                tracing::debug!("deleted scratch workspace {}", handle.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Destroy {
                path: handle.path.clone(),
                source,
            }),
        }
    }
}

impl Default for ScratchWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
