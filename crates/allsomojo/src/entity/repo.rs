//! Repo entity - one catalog entry per hosted repository.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::blacklist_reason::BlacklistReason;

/// A catalog entry, keyed by the hosting service's `owner/name`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repos")]
pub struct Model {
    /// `owner/name` as reported by the hosting service.
    #[sea_orm(primary_key, auto_increment = false)]
    pub full_name: String,

    // ─── Hosting Metadata ────────────────────────────────────────────────────
    pub repo_name: String,
    pub username: String,
    #[sea_orm(default_value = false)]
    pub fork: bool,
    /// `User` or `Organization`.
    pub user_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_avatar_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub forks: Option<i32>,
    pub created_at: Option<DateTimeWithTimeZone>,
    pub updated_at: Option<DateTimeWithTimeZone>,
    pub pushed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub clone_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub homepage: Option<String>,
    /// Size in KB as reported by the host.
    pub size: Option<i64>,
    pub stargazers_count: Option<i32>,
    pub watchers: Option<i32>,
    pub language: Option<String>,
    pub open_issues: Option<i32>,
    pub license: Option<String>,
    /// Topic list, stored as a JSON array.
    #[sea_orm(column_type = "Json")]
    pub topics: serde_json::Value,

    // ─── Mirror Statistics ───────────────────────────────────────────────────
    /// Lifetime commit count across all refs.
    pub commits: Option<i32>,
    #[sea_orm(column_name = "n_mojo_files")]
    pub n_mojo_files: Option<i32>,
    #[sea_orm(column_name = "n_python_files")]
    pub n_python_files: Option<i32>,
    #[sea_orm(column_name = "n_notebook_files")]
    pub n_notebook_files: Option<i32>,
    #[sea_orm(column_name = "n_code_lines")]
    pub n_code_lines: Option<i64>,
    #[sea_orm(column_name = "lines_added_30d")]
    pub lines_added_30d: Option<i64>,
    #[sea_orm(column_name = "lines_deleted_30d")]
    pub lines_deleted_30d: Option<i64>,
    #[sea_orm(column_name = "files_changed_30d")]
    pub files_changed_30d: Option<i32>,

    // ─── Mirror ──────────────────────────────────────────────────────────────
    /// Absolute path of the local working copy, once cloned.
    #[sea_orm(column_type = "Text", nullable)]
    pub local_path: Option<String>,
    pub last_pulled_at: Option<DateTimeWithTimeZone>,

    // ─── Crawl Bookkeeping ───────────────────────────────────────────────────
    pub first_crawled_at: DateTimeWithTimeZone,
    pub last_crawled_at: DateTimeWithTimeZone,
    /// Number of times a search or refresh has reported this entry.
    #[sea_orm(column_name = "n_crawls", default_value = 1)]
    pub n_crawls: i32,

    // ─── Curation ────────────────────────────────────────────────────────────
    pub blacklisted_reason: Option<BlacklistReason>,
    /// Set by a person; frees the entry from automatic classification.
    #[sea_orm(default_value = false)]
    pub manually_checked: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::repo_query::Entity")]
    RepoQuery,
}

impl Related<super::repo_query::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RepoQuery.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the entry is currently part of the published catalog.
    pub fn is_listed(&self) -> bool {
        self.blacklisted_reason.is_none()
    }

    /// Topics as plain strings, skipping anything that is not a JSON string.
    pub fn topic_list(&self) -> Vec<String> {
        self.topics
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn make_test_model(full_name: &str) -> Model {
        let now = Utc::now().fixed_offset();
        let (username, repo_name) = full_name.split_once('/').unwrap();
        Model {
            full_name: full_name.to_string(),
            repo_name: repo_name.to_string(),
            username: username.to_string(),
            fork: false,
            user_type: Some("User".to_string()),
            user_avatar_url: None,
            description: None,
            forks: Some(0),
            created_at: Some(now),
            updated_at: Some(now),
            pushed_at: Some(now),
            clone_url: Some(format!("https://github.com/{full_name}.git")),
            homepage: None,
            size: Some(12),
            stargazers_count: Some(3),
            watchers: Some(3),
            language: Some("Mojo".to_string()),
            open_issues: Some(0),
            license: None,
            topics: serde_json::json!(["mojo", 7, "llm"]),
            commits: None,
            n_mojo_files: None,
            n_python_files: None,
            n_notebook_files: None,
            n_code_lines: None,
            lines_added_30d: None,
            lines_deleted_30d: None,
            files_changed_30d: None,
            local_path: None,
            last_pulled_at: None,
            first_crawled_at: now,
            last_crawled_at: now,
            n_crawls: 1,
            blacklisted_reason: None,
            manually_checked: false,
        }
    }

    #[test]
    fn topic_list_skips_non_strings() {
        let model = make_test_model("acme/hello");
        assert_eq!(model.topic_list(), vec!["mojo", "llm"]);
    }

    #[test]
    fn listed_until_blacklisted() {
        let mut model = make_test_model("acme/hello");
        assert!(model.is_listed());
        model.blacklisted_reason = Some(BlacklistReason::NotFound);
        assert!(!model.is_listed());
    }
}
