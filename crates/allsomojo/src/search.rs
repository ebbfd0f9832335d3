//! Discovery: windowed repository search, code search and the refresh of
//! entries the searches did not report.

mod refresh;
mod searcher;
mod window;
mod writer;

pub use refresh::{RefreshReport, refresh_saved_repos};
pub use searcher::{
    FailedQuery, RepoSearcher, SearchHit, SearchOptions, SearchReport, query_variants,
};
pub use window::{SearchWindow, resume_date, search_windows};
pub use writer::{WriterReport, await_catalog_writer, spawn_catalog_writer};
