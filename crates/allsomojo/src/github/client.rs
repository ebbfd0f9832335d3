use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::config::GitHubSettings;
use crate::http::{
    HttpHeaders, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, header_get,
};
use crate::platform::{
    ApiRateLimiter, ApiResponse, HostingClient, PlatformError, RateLimitInfo, RepoMetadata,
    Result, SearchPage,
};

use super::types::{CodeSearchItem, ErrorBody, GitHubRepo, SearchResponse};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("allsomojo/", env!("CARGO_PKG_VERSION"));

/// GitHub REST client over an injectable [`HttpTransport`].
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    token: Option<String>,
    rate_limiter: Option<ApiRateLimiter>,
}

impl GitHubClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            rate_limiter: None,
        }
    }

    /// Pace every request through `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: ApiRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Build a reqwest-backed client from configuration.
    pub fn from_settings(settings: &GitHubSettings) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(
            Duration::from_secs(settings.request_timeout_secs),
            USER_AGENT,
        )
        .map_err(|e| PlatformError::internal(e.to_string()))?;

        let mut client = Self::new(
            Arc::new(transport),
            &settings.api_url,
            settings.token.clone(),
        );
        if settings.requests_per_minute > 0 {
            let limiter = ApiRateLimiter::per_minute(settings.requests_per_minute);
            client = client.with_rate_limiter(limiter);
        }
        Ok(client)
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
    }

    fn search_url(&self, kind: &str, query: &str, page: u32, per_page: u32) -> String {
        let sort = if kind == "repositories" {
            "&sort=updated&order=asc"
        } else {
            ""
        };
        format!(
            "{}/search/{kind}?q={}{sort}&per_page={per_page}&page={page}",
            self.api_url,
            urlencoding::encode(query)
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        resource: &str,
    ) -> Result<ApiResponse<T>> {
        self.wait_for_rate_limit().await;

        let mut request = HttpRequest::get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = self.transport.send(request).await?;
        let rate_limit = parse_rate_limit_headers(&response.headers);

        if !response.is_success() {
            return Err(classify_error(&response, rate_limit.as_ref(), resource));
        }

        let data = serde_json::from_slice(&response.body)
            .map_err(|e| PlatformError::decode(format!("{resource}: {e}")))?;
        Ok(ApiResponse { data, rate_limit })
    }
}

/// Extract quota info from `x-ratelimit-*` headers.
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitInfo> {
    let limit = header_get(headers, "x-ratelimit-limit")?
        .parse::<usize>()
        .ok()?;
    let remaining = header_get(headers, "x-ratelimit-remaining")?
        .parse::<usize>()
        .ok()?;
    let reset_epoch = header_get(headers, "x-ratelimit-reset")?
        .parse::<i64>()
        .ok()?;
    let reset_at = chrono::DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

/// Map a non-success response onto the platform error taxonomy.
fn classify_error(
    response: &HttpResponse,
    rate_limit: Option<&RateLimitInfo>,
    resource: &str,
) -> PlatformError {
    let message = serde_json::from_slice::<ErrorBody>(&response.body)
        .map(|b| b.message)
        .unwrap_or_else(|_| response.text());

    match response.status {
        404 | 451 => PlatformError::not_found(resource),
        403 | 429 => {
            let lower = message.to_ascii_lowercase();
            let exhausted = rate_limit.is_some_and(RateLimitInfo::is_exhausted);
            if lower.contains("secondary rate limit") {
                PlatformError::SecondaryRateLimited {
                    retry_after: response
                        .header("retry-after")
                        .and_then(|v| v.parse::<u64>().ok()),
                }
            } else if lower.contains("rate limit") || exhausted {
                PlatformError::RateLimited {
                    reset_at: rate_limit.map(|r| r.reset_at).unwrap_or_else(Utc::now),
                }
            } else {
                PlatformError::api(response.status, message)
            }
        }
        status => PlatformError::api(status, message),
    }
}

#[async_trait]
impl HostingClient for GitHubClient {
    async fn search_repositories(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<SearchPage<RepoMetadata>>> {
        let url = self.search_url("repositories", query, page, per_page);
        let resp: ApiResponse<SearchResponse<GitHubRepo>> = self.get_json(url, query).await?;
        let page = resp.data;
        Ok(ApiResponse {
            data: SearchPage {
                total_count: page.total_count,
                incomplete_results: page.incomplete_results,
                items: page.items.into_iter().map(RepoMetadata::from).collect(),
            },
            rate_limit: resp.rate_limit,
        })
    }

    async fn search_code(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<SearchPage<String>>> {
        let url = self.search_url("code", query, page, per_page);
        let resp: ApiResponse<SearchResponse<CodeSearchItem>> = self.get_json(url, query).await?;
        Ok(ApiResponse {
            data: SearchPage {
                total_count: resp.data.total_count,
                incomplete_results: resp.data.incomplete_results,
                items: resp
                    .data
                    .items
                    .into_iter()
                    .map(|item| item.repository.full_name)
                    .collect(),
            },
            rate_limit: resp.rate_limit,
        })
    }

    async fn get_repo(&self, full_name: &str) -> Result<ApiResponse<RepoMetadata>> {
        let url = format!("{}/repos/{full_name}", self.api_url);
        let resp: ApiResponse<GitHubRepo> = self.get_json(url, full_name).await?;
        Ok(ApiResponse {
            data: RepoMetadata::from(resp.data),
            rate_limit: resp.rate_limit,
        })
    }
}
