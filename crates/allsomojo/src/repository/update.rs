use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, sea_query::Expr};

use crate::entity::blacklist_reason::BlacklistReason;
use crate::entity::repo::{Column, Entity as Repo};
use crate::stats::MirrorStats;

use super::errors::{CatalogError, Result};

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Record the verified working copy for `full_name`.
pub async fn set_local_path(
    db: &DatabaseConnection,
    full_name: &str,
    local_path: &str,
) -> Result<()> {
    let result = Repo::update_many()
        .col_expr(Column::LocalPath, Expr::value(local_path))
        .filter(Column::FullName.eq(full_name))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(CatalogError::not_found(full_name));
    }
    Ok(())
}

/// Stamp a successful pull. Returns the number of entries updated.
pub async fn mark_pulled(
    db: &DatabaseConnection,
    local_path: &str,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result = Repo::update_many()
        .col_expr(Column::LastPulledAt, Expr::value(at.fixed_offset()))
        .filter(Column::LocalPath.eq(local_path))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Write one mirror's statistics in a single statement.
///
/// A lifetime commit count that could not be computed leaves the stored
/// value alone.
pub async fn record_mirror_stats(
    db: &DatabaseConnection,
    local_path: &str,
    stats: &MirrorStats,
) -> Result<u64> {
    let mut update = Repo::update_many()
        .col_expr(
            Column::NMojoFiles,
            Expr::value(clamp_i32(stats.files.n_mojo_files)),
        )
        .col_expr(
            Column::NPythonFiles,
            Expr::value(clamp_i32(stats.files.n_python_files)),
        )
        .col_expr(
            Column::NNotebookFiles,
            Expr::value(clamp_i32(stats.files.n_notebook_files)),
        )
        .col_expr(
            Column::NCodeLines,
            Expr::value(clamp_i64(stats.files.n_code_lines)),
        )
        .col_expr(
            Column::LinesAdded30d,
            Expr::value(clamp_i64(stats.changes.lines_added)),
        )
        .col_expr(
            Column::LinesDeleted30d,
            Expr::value(clamp_i64(stats.changes.lines_deleted)),
        )
        .col_expr(
            Column::FilesChanged30d,
            Expr::value(clamp_i32(stats.changes.files_changed.len() as u64)),
        );

    if let Some(commits) = stats.commits {
        update = update.col_expr(Column::Commits, Expr::value(clamp_i32(commits)));
    }

    let result = update
        .filter(Column::LocalPath.eq(local_path))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Blacklist an entry the host no longer knows, unless a person has
/// already reviewed it. Returns whether the entry changed.
pub async fn mark_not_found(db: &DatabaseConnection, full_name: &str) -> Result<bool> {
    let result = Repo::update_many()
        .col_expr(
            Column::BlacklistedReason,
            Expr::value(BlacklistReason::NotFound),
        )
        .filter(Column::FullName.eq(full_name))
        .filter(Column::ManuallyChecked.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}
