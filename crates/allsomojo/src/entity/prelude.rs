//! Common re-exports for convenient entity usage.

pub use super::blacklist_reason::BlacklistReason;
pub use super::repo::{
    ActiveModel as RepoActiveModel, Column as RepoColumn, Entity as Repo, Model as RepoModel,
};
pub use super::repo_query::{
    ActiveModel as RepoQueryActiveModel, Column as RepoQueryColumn, Entity as RepoQuery,
    Model as RepoQueryModel,
};
