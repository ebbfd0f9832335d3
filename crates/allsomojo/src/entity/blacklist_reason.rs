//! Reasons an entry is excluded from the published catalog.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why a repository is blacklisted.
///
/// Stored as the human-readable string so the column stays legible in ad hoc
/// queries against the database.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum BlacklistReason {
    /// Has code but no Mojo files; a person should look at it.
    #[sea_orm(string_value = "needs review")]
    NeedsReview,
    /// Reviewed and found not to contain Mojo code.
    #[sea_orm(string_value = "not mojo code")]
    NotMojoCode,
    /// Mirrored, but holds no recognized code files at all.
    #[sea_orm(string_value = "no code files")]
    NoCodeFiles,
    /// The hosting service no longer knows the repository.
    #[sea_orm(string_value = "not found")]
    NotFound,
}

impl std::fmt::Display for BlacklistReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BlacklistReason::NeedsReview => "needs review",
            BlacklistReason::NotMojoCode => "not mojo code",
            BlacklistReason::NoCodeFiles => "no code files",
            BlacklistReason::NotFound => "not found",
        })
    }
}
