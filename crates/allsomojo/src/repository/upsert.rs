use chrono::{DateTime, Utc};
use sea_orm::{
    DatabaseConnection, EntityTrait, Set,
    sea_query::{Alias, Expr, OnConflict, SimpleExpr},
};

use crate::entity::repo::{ActiveModel, Column, Entity as Repo};
use crate::entity::repo_query;
use crate::platform::RepoMetadata;

use super::errors::{CatalogError, Result};

// ─── Conflict Clause ─────────────────────────────────────────────────────────

/// Columns owned by the hosting service; a fresh fetch overwrites them all.
const HOSTED_COLUMNS: [Column; 19] = [
    Column::RepoName,
    Column::Username,
    Column::Fork,
    Column::UserType,
    Column::UserAvatarUrl,
    Column::Description,
    Column::Forks,
    Column::CreatedAt,
    Column::UpdatedAt,
    Column::PushedAt,
    Column::CloneUrl,
    Column::Homepage,
    Column::Size,
    Column::StargazersCount,
    Column::Watchers,
    Column::Language,
    Column::OpenIssues,
    Column::License,
    Column::Topics,
];

/// The later of the stored and the incoming `last_crawled_at`.
fn latest_crawl() -> SimpleExpr {
    let incoming = Expr::col((Alias::new("excluded"), Column::LastCrawledAt));
    let stored = Expr::col((Repo, Column::LastCrawledAt));
    Expr::case(incoming.clone().gt(stored.clone()), incoming)
        .finally(stored)
        .into()
}

/// `ON CONFLICT (full_name) DO UPDATE`: overwrite hosted fields, bump the
/// crawl counter in place and move `last_crawled_at` forward only. Mirror
/// state, statistics and curation columns are left untouched.
pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::FullName)
        .update_columns(HOSTED_COLUMNS)
        .value(Column::NCrawls, Expr::col((Repo, Column::NCrawls)).add(1))
        .value(Column::LastCrawledAt, latest_crawl())
        .to_owned()
}

fn saturating_i32(value: Option<u32>) -> Option<i32> {
    value.map(|n| i32::try_from(n).unwrap_or(i32::MAX))
}

pub(crate) fn repo_active_model(meta: &RepoMetadata, crawled_at: DateTime<Utc>) -> ActiveModel {
    let crawled_at = crawled_at.fixed_offset();
    ActiveModel {
        full_name: Set(meta.full_name.clone()),
        repo_name: Set(meta.repo_name.clone()),
        username: Set(meta.username.clone()),
        fork: Set(meta.fork),
        user_type: Set(meta.user_type.clone()),
        user_avatar_url: Set(meta.user_avatar_url.clone()),
        description: Set(meta.description.clone()),
        forks: Set(saturating_i32(meta.forks)),
        created_at: Set(meta.created_at.map(|t| t.fixed_offset())),
        updated_at: Set(meta.updated_at.map(|t| t.fixed_offset())),
        pushed_at: Set(meta.pushed_at.map(|t| t.fixed_offset())),
        clone_url: Set(meta.clone_url.clone()),
        homepage: Set(meta.homepage.clone()),
        size: Set(meta.size.map(|s| i64::try_from(s).unwrap_or(i64::MAX))),
        stargazers_count: Set(saturating_i32(meta.stargazers_count)),
        watchers: Set(saturating_i32(meta.watchers)),
        language: Set(meta.language.clone()),
        open_issues: Set(saturating_i32(meta.open_issues)),
        license: Set(meta.license.clone()),
        topics: Set(serde_json::Value::from(meta.topics.clone())),
        first_crawled_at: Set(crawled_at),
        last_crawled_at: Set(crawled_at),
        n_crawls: Set(1),
        manually_checked: Set(false),
        ..Default::default()
    }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Insert or refresh a catalog entry in one statement.
///
/// A new entry starts with `n_crawls = 1` and both crawl timestamps set to
/// `crawled_at`. An existing entry gets every hosted field overwritten,
/// `n_crawls` incremented and `last_crawled_at` raised to `crawled_at` if
/// that is later.
pub async fn upsert_repo(
    db: &DatabaseConnection,
    meta: &RepoMetadata,
    crawled_at: DateTime<Utc>,
) -> Result<()> {
    if meta.full_name.is_empty() {
        return Err(CatalogError::invalid_input("repository without a full name"));
    }

    Repo::insert(repo_active_model(meta, crawled_at))
        .on_conflict(build_upsert_on_conflict())
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Record that `query` reported `full_name`. Repeats are no-ops.
pub async fn record_query(db: &DatabaseConnection, full_name: &str, query: &str) -> Result<()> {
    let model = repo_query::ActiveModel {
        full_name: Set(full_name.to_string()),
        query: Set(query.to_string()),
    };

    repo_query::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([repo_query::Column::FullName, repo_query::Column::Query])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Persist one search result: provenance first, then the entry itself.
pub async fn save_hit(
    db: &DatabaseConnection,
    meta: &RepoMetadata,
    query: Option<&str>,
    crawled_at: DateTime<Utc>,
) -> Result<()> {
    if let Some(query) = query {
        record_query(db, &meta.full_name, query).await?;
    }
    upsert_repo(db, meta, crawled_at).await
}

/// Default number of retry attempts for catalog writes.
pub const DEFAULT_UPSERT_RETRIES: u32 = 3;

/// Default initial backoff in milliseconds for catalog write retries.
pub const DEFAULT_UPSERT_BACKOFF_MS: u64 = 100;

/// [`save_hit`] with exponential backoff on transient database errors.
///
/// Both statements are idempotent apart from the crawl counter, and a failed
/// upsert never committed its increment, so a retry cannot double count.
pub async fn save_hit_with_retry(
    db: &DatabaseConnection,
    meta: &RepoMetadata,
    query: Option<&str>,
    crawled_at: DateTime<Utc>,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<()> {
    let mut backoff_ms = initial_backoff_ms;
    let mut attempt = 0;

    loop {
        match save_hit(db, meta, query, crawled_at).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    repo = %meta.full_name,
                    attempt,
                    max_retries,
                    backoff_ms,
                    error = %e,
                    "catalog write failed, retrying"
                );
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
