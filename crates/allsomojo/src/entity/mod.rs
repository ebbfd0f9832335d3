//! SeaORM entity definitions for the catalog schema.

pub mod blacklist_reason;
pub mod prelude;
pub mod repo;
pub mod repo_query;
