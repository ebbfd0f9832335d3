use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

use crate::repository::CatalogError;

/// A failed `git` invocation.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("`git {command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`git {command}` produced non-UTF-8 output")]
    Decode { command: String },
}

/// Why one repository could not be mirrored.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("no clone URL recorded")]
    MissingCloneUrl,

    #[error("`{full_name}` is not an owner/name pair")]
    InvalidName { full_name: String },

    /// The target exists but is not a working copy (no `.git`).
    #[error("{} is not a git working copy", path.display())]
    InvalidWorkingCopy { path: PathBuf },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("clone task failed: {0}")]
    Task(#[from] JoinError),
}

impl CloneError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why one mirror could not be brought up to date.
#[derive(Debug, Error)]
pub enum PullError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("pull task failed: {0}")]
    Task(#[from] JoinError),
}
