//! Per-mirror statistics: code file counts and recent commit activity.
//!
//! Walking a checkout and parsing logs is CPU-bound, so the extractor runs
//! a fixed pool of blocking workers that drain a queue filled up front.

mod extractor;
mod files;
mod log_parse;

use thiserror::Error;

use crate::repository::CatalogError;

pub use extractor::{
    MirrorStats, StatsExtractor, StatsOptions, StatsReport, default_workers, repo_changes,
    total_commits, window_start,
};
pub use files::{FileCounts, FileKind, count_code_files};
pub use log_parse::{CommitStats, count_commit_lines, parse_stat_log, self_test};

#[derive(Debug, Error)]
pub enum StatsError {
    /// The log parser no longer understands git's output.
    #[error("git log format drift: expected {expected}, parsed {actual}")]
    FormatDrift { expected: String, actual: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("stats worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
