use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, sea_query::Expr,
};

use crate::entity::repo::{Column, Entity as Repo, Model};
use crate::entity::repo_query;

use super::errors::Result;

/// A catalog entry without a mirror yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneCandidate {
    pub full_name: String,
    pub clone_url: Option<String>,
}

fn listed_unless(select: Select<Repo>, include_blacklisted: bool) -> Select<Repo> {
    if include_blacklisted {
        select
    } else {
        select.filter(Column::BlacklistedReason.is_null())
    }
}

pub async fn find_by_full_name(db: &DatabaseConnection, full_name: &str) -> Result<Option<Model>> {
    Ok(Repo::find_by_id(full_name.to_string()).one(db).await?)
}

pub async fn count(db: &DatabaseConnection) -> Result<u64> {
    Ok(Repo::find().count(db).await?)
}

/// Every query that has reported `full_name`, sorted.
pub async fn queries_for(db: &DatabaseConnection, full_name: &str) -> Result<Vec<String>> {
    let rows = repo_query::Entity::find()
        .filter(repo_query::Column::FullName.eq(full_name))
        .order_by_asc(repo_query::Column::Query)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.query).collect())
}

/// Newest hosting-side `updated_at` in the catalog.
pub async fn search_watermark(db: &DatabaseConnection) -> Result<Option<DateTime<Utc>>> {
    let newest = Repo::find()
        .filter(Column::UpdatedAt.is_not_null())
        .order_by_desc(Column::UpdatedAt)
        .one(db)
        .await?;
    Ok(newest
        .and_then(|m| m.updated_at)
        .map(|t| t.with_timezone(&Utc)))
}

/// Local paths of mirrors that are behind the host: never pulled, or last
/// pulled before the latest push.
pub async fn pull_candidates(
    db: &DatabaseConnection,
    include_blacklisted: bool,
) -> Result<Vec<String>> {
    let stale = Condition::any()
        .add(Column::LastPulledAt.is_null())
        .add(Expr::col(Column::LastPulledAt).lt(Expr::col(Column::PushedAt)));

    let rows = listed_unless(Repo::find(), include_blacklisted)
        .filter(Column::LocalPath.is_not_null())
        .filter(stale)
        .order_by_asc(Column::FullName)
        .all(db)
        .await?;
    Ok(rows.into_iter().filter_map(|m| m.local_path).collect())
}

/// Entries that have no mirror yet.
pub async fn clone_candidates(
    db: &DatabaseConnection,
    include_blacklisted: bool,
) -> Result<Vec<CloneCandidate>> {
    let rows = listed_unless(Repo::find(), include_blacklisted)
        .filter(Column::LocalPath.is_null())
        .order_by_asc(Column::FullName)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|m| CloneCandidate {
            full_name: m.full_name,
            clone_url: m.clone_url,
        })
        .collect())
}

/// Every recorded mirror path.
pub async fn mirror_paths(
    db: &DatabaseConnection,
    include_blacklisted: bool,
) -> Result<Vec<String>> {
    let paths: Vec<Option<String>> = listed_unless(Repo::find(), include_blacklisted)
        .select_only()
        .column(Column::LocalPath)
        .filter(Column::LocalPath.is_not_null())
        .order_by_asc(Column::LocalPath)
        .into_tuple()
        .all(db)
        .await?;
    Ok(paths.into_iter().flatten().collect())
}

/// Entries not re-reported since `crawled_before`.
pub async fn refresh_candidates(
    db: &DatabaseConnection,
    crawled_before: DateTime<Utc>,
    include_blacklisted: bool,
) -> Result<Vec<String>> {
    let names: Vec<String> = listed_unless(Repo::find(), include_blacklisted)
        .select_only()
        .column(Column::FullName)
        .filter(Column::LastCrawledAt.lt(crawled_before.fixed_offset()))
        .order_by_asc(Column::LastCrawledAt)
        .into_tuple()
        .all(db)
        .await?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait};

    use super::*;

    #[test]
    fn pull_filter_compares_pull_and_push_times() {
        let sql = listed_unless(Repo::find(), false)
            .filter(Column::LocalPath.is_not_null())
            .filter(
                Condition::any()
                    .add(Column::LastPulledAt.is_null())
                    .add(Expr::col(Column::LastPulledAt).lt(Expr::col(Column::PushedAt))),
            )
            .build(DatabaseBackend::Sqlite)
            .to_string();

        assert!(sql.contains(r#""blacklisted_reason" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""last_pulled_at" < "pushed_at""#), "{sql}");
    }

    #[test]
    fn include_blacklisted_drops_the_filter() {
        let sql = listed_unless(Repo::find(), true)
            .build(DatabaseBackend::Sqlite)
            .to_string();
        assert!(!sql.contains("blacklisted_reason\" IS NULL"), "{sql}");
    }

    #[tokio::test]
    async fn watermark_is_none_for_empty_catalog() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<Model>::new()])
            .into_connection();
        assert_eq!(search_watermark(&db).await.expect("query"), None);
    }
}
