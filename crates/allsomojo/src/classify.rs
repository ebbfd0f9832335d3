//! Blacklist/review classification from measured file counts.
//!
//! Rules apply in order, only to entries nobody has reviewed by hand:
//!
//! 1. A mirror with no tracked code files at all → `"no code files"`.
//! 2. Mojo files present but blacklisted → listed again.
//! 3. No Mojo files and not blacklisted → `"needs review"`.
//!
//! Every rule is a single `UPDATE`, and running the classifier twice leaves
//! the catalog unchanged.

use std::fmt;

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, sea_query::Expr,
};

use crate::entity::blacklist_reason::BlacklistReason;
use crate::entity::repo::{Column, Entity as Repo};
use crate::repository::Result;

/// Rows changed per rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    pub no_code_files: u64,
    pub restored: u64,
    pub needs_review: u64,
}

impl fmt::Display for ClassifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} without code files, {} restored, {} need review",
            self.no_code_files, self.restored, self.needs_review
        )
    }
}

fn zero_or_null(column: Column) -> Condition {
    Condition::any().add(column.is_null()).add(column.eq(0))
}

fn no_code_files_condition() -> Condition {
    Condition::all()
        .add(Column::ManuallyChecked.eq(false))
        .add(Column::BlacklistedReason.is_null())
        .add(Column::LocalPath.is_not_null())
        .add(zero_or_null(Column::NMojoFiles))
        .add(zero_or_null(Column::NPythonFiles))
        .add(zero_or_null(Column::NNotebookFiles))
}

fn restore_condition() -> Condition {
    Condition::all()
        .add(Column::ManuallyChecked.eq(false))
        .add(Column::BlacklistedReason.is_not_null())
        .add(Column::NMojoFiles.gt(0))
}

fn needs_review_condition() -> Condition {
    Condition::all()
        .add(Column::ManuallyChecked.eq(false))
        .add(Column::BlacklistedReason.is_null())
        .add(Column::NMojoFiles.eq(0))
}

/// Apply the three rules in order.
#[tracing::instrument(skip(db))]
pub async fn classify(db: &DatabaseConnection) -> Result<ClassifyReport> {
    let no_code_files = Repo::update_many()
        .col_expr(
            Column::BlacklistedReason,
            Expr::value(BlacklistReason::NoCodeFiles),
        )
        .filter(no_code_files_condition())
        .exec(db)
        .await?
        .rows_affected;
    tracing::info!(
        rows = no_code_files,
        "blacklisted mirrors without code files"
    );

    let restored = Repo::update_many()
        .col_expr(
            Column::BlacklistedReason,
            Expr::value(Option::<String>::None),
        )
        .filter(restore_condition())
        .exec(db)
        .await?
        .rows_affected;
    tracing::info!(
        rows = restored,
        "restored blacklisted entries with Mojo files"
    );

    let needs_review = Repo::update_many()
        .col_expr(
            Column::BlacklistedReason,
            Expr::value(BlacklistReason::NeedsReview),
        )
        .filter(needs_review_condition())
        .exec(db)
        .await?
        .rows_affected;
    tracing::info!(
        rows = needs_review,
        "flagged entries without Mojo files for review"
    );

    Ok(ClassifyReport {
        no_code_files,
        restored,
        needs_review,
    })
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait};

    use super::*;

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn sql(condition: Condition) -> String {
        Repo::update_many()
            .col_expr(Column::BlacklistedReason, Expr::value("x"))
            .filter(condition)
            .build(DatabaseBackend::Sqlite)
            .to_string()
    }

    #[test]
    fn no_code_rule_treats_null_counts_as_zero() {
        let sql = sql(no_code_files_condition());
        assert!(
            sql.contains(r#""n_mojo_files" IS NULL OR "n_mojo_files" = 0"#),
            "{sql}"
        );
        assert!(sql.contains(r#""n_notebook_files" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""local_path" IS NOT NULL"#), "{sql}");
        assert!(sql.contains(r#""manually_checked" ="#), "{sql}");
    }

    #[test]
    fn review_rule_ignores_unmeasured_entries() {
        let sql = sql(needs_review_condition());
        assert!(sql.contains(r#""n_mojo_files" = 0"#), "{sql}");
        assert!(!sql.contains(r#""n_mojo_files" IS NULL"#), "{sql}");
    }

    #[tokio::test]
    async fn reports_rows_per_rule() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([exec(2), exec(1), exec(4)])
            .into_connection();

        let report = classify(&db).await.expect("classify");
        assert_eq!(
            report,
            ClassifyReport {
                no_code_files: 2,
                restored: 1,
                needs_review: 4,
            }
        );
        assert_eq!(
            report.to_string(),
            "2 without code files, 1 restored, 4 need review"
        );
        assert_eq!(db.into_transaction_log().len(), 3);
    }
}
