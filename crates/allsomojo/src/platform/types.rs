use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::Result;

/// Quota state reported alongside a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: usize,
    pub remaining: usize,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Hosting-service metadata for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    /// `owner/name`.
    pub full_name: String,
    pub repo_name: String,
    pub username: String,
    pub fork: bool,
    pub user_type: Option<String>,
    pub user_avatar_url: Option<String>,
    pub description: Option<String>,
    pub forks: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub clone_url: Option<String>,
    pub homepage: Option<String>,
    /// Size in KB.
    pub size: Option<u64>,
    pub stargazers_count: Option<u32>,
    pub watchers: Option<u32>,
    pub language: Option<String>,
    pub open_issues: Option<u32>,
    pub license: Option<String>,
    pub topics: Vec<String>,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage<T> {
    pub total_count: u64,
    pub incomplete_results: bool,
    pub items: Vec<T>,
}

/// A decoded payload plus whatever quota headers came with it.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub rate_limit: Option<RateLimitInfo>,
}

/// The hosting-service operations discovery needs.
///
/// Implementations classify throttling into
/// [`PlatformError::RateLimited`](super::PlatformError::RateLimited) /
/// [`PlatformError::SecondaryRateLimited`](super::PlatformError::SecondaryRateLimited)
/// and a vanished repository into
/// [`PlatformError::NotFound`](super::PlatformError::NotFound).
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Repository search. Pages are 1-based.
    async fn search_repositories(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<SearchPage<RepoMetadata>>>;

    /// Code search. Items are the `owner/name` of each matching repository,
    /// in hit order and possibly repeated.
    async fn search_code(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<SearchPage<String>>>;

    /// Fetch a single repository by `owner/name`.
    async fn get_repo(&self, full_name: &str) -> Result<ApiResponse<RepoMetadata>>;
}
