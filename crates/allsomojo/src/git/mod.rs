//! Local mirrors: the `git` subprocess seam and the clone/pull orchestrator.

mod error;
mod runner;
mod sync;

pub use error::{CloneError, GitError, PullError};
pub use runner::{GitRunner, SystemGit};
pub use sync::{GitSync, GitSyncOptions, SyncFailure, SyncReport, clone_target, is_working_copy};
