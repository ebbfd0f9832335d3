//! Wire types for the subset of the GitHub REST API the catalog reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope shared by `/search/repositories` and `/search/code`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<T> {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub owner: GitHubOwner,
    #[serde(default)]
    pub fork: bool,
    pub description: Option<String>,
    pub forks_count: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub clone_url: Option<String>,
    pub homepage: Option<String>,
    pub size: Option<u64>,
    pub stargazers_count: Option<u32>,
    pub watchers_count: Option<u32>,
    pub language: Option<String>,
    pub open_issues_count: Option<u32>,
    pub license: Option<GitHubLicense>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
    #[serde(rename = "type")]
    pub owner_type: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubLicense {
    pub name: Option<String>,
    pub spdx_id: Option<String>,
}

/// A code-search hit; only the owning repository matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSearchItem {
    pub repository: CodeSearchRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeSearchRepository {
    pub full_name: String,
}

/// Error body GitHub returns with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
