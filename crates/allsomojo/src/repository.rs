//! Catalog storage operations.
//!
//! Writes go through native conflict clauses so concurrent writers never
//! race a read-then-write; reads return plain values for the sync and stats
//! stages to work from.

mod errors;
mod query;
mod update;
mod upsert;

pub use errors::{CatalogError, Result};
pub use query::{
    CloneCandidate, clone_candidates, count, find_by_full_name, mirror_paths, pull_candidates,
    queries_for, refresh_candidates, search_watermark,
};
pub use update::{mark_not_found, mark_pulled, record_mirror_stats, set_local_path};
pub use upsert::{
    DEFAULT_UPSERT_BACKOFF_MS, DEFAULT_UPSERT_RETRIES, record_query, save_hit,
    save_hit_with_retry, upsert_repo,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DbBackend, EntityTrait, QueryTrait};

    use crate::entity::repo::Entity as Repo;
    use crate::platform::RepoMetadata;

    fn metadata(full_name: &str) -> RepoMetadata {
        let (username, repo_name) = full_name.split_once('/').unwrap();
        RepoMetadata {
            full_name: full_name.to_string(),
            repo_name: repo_name.to_string(),
            username: username.to_string(),
            fork: false,
            user_type: Some("User".to_string()),
            user_avatar_url: None,
            description: Some("mojo things".to_string()),
            forks: Some(1),
            created_at: None,
            updated_at: Some(Utc::now()),
            pushed_at: None,
            clone_url: None,
            homepage: None,
            size: Some(4),
            stargazers_count: Some(2),
            watchers: Some(2),
            language: Some("Mojo".to_string()),
            open_issues: None,
            license: None,
            topics: vec!["mojo".to_string()],
        }
    }

    #[test]
    fn upsert_sql_increments_crawl_counter() {
        let sql = Repo::insert(upsert::repo_active_model(&metadata("acme/hello"), Utc::now()))
            .on_conflict(upsert::build_upsert_on_conflict())
            .build(DbBackend::Sqlite)
            .to_string();

        assert!(
            sql.contains(r#"ON CONFLICT ("full_name") DO UPDATE SET"#),
            "{sql}"
        );
        assert!(
            sql.contains(r#""n_crawls" = "repos"."n_crawls" + 1"#),
            "{sql}"
        );
        // Curation and mirror state belong to other writers.
        assert!(!sql.contains(r#""manually_checked" = "excluded""#), "{sql}");
        assert!(!sql.contains(r#""first_crawled_at" = "excluded""#), "{sql}");
        assert!(!sql.contains(r#""local_path" = "excluded""#), "{sql}");
    }

    #[test]
    fn catalog_error_messages() {
        let err = CatalogError::not_found("acme/hello");
        assert!(err.to_string().contains("acme/hello"));

        let err = CatalogError::from(sea_orm::DbErr::Custom("database is locked".to_string()));
        assert!(err.is_transient());
    }
}
