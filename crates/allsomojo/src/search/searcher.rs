use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;

use crate::config::SearchSettings;
use crate::platform::{
    ApiResponse, HostingClient, PlatformError, RateLimitInfo, RepoMetadata, SearchPage,
    short_error_message, wait_for_quota,
};
use crate::retry::{ThrottleRetry, with_throttle_retry};

use super::window::search_windows;

/// A repository reported by a query. `query` is the provenance recorded in
/// the catalog: the search term with its fork qualifier, or the code query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub repo: RepoMetadata,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub terms: Vec<String>,
    pub code_queries: Vec<String>,
    pub window_days: u32,
    pub per_page: u32,
    /// The provider stops returning results past this many per query.
    pub max_results: u64,
    pub throttle: ThrottleRetry,
    pub quota_margin: Duration,
}

impl SearchOptions {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            terms: settings.terms.clone(),
            code_queries: settings.code_queries.clone(),
            window_days: settings.window_days,
            per_page: settings.per_page.clamp(1, 100),
            max_results: u64::from(settings.max_results),
            throttle: ThrottleRetry::new(
                Duration::from_secs(settings.throttle_pause_secs),
                settings.max_throttle_retries,
            ),
            quota_margin: Duration::from_secs(settings.quota_margin_secs),
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

/// A query that was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedQuery {
    pub query: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchReport {
    pub queries: usize,
    pub pages: usize,
    pub hits: usize,
    pub failed: Vec<FailedQuery>,
}

impl SearchReport {
    pub fn merge(&mut self, other: SearchReport) {
        self.queries += other.queries;
        self.pages += other.pages;
        self.hits += other.hits;
        self.failed.extend(other.failed);
    }
}

/// Whether the consumer is still listening.
enum Flow {
    Continue,
    Closed,
}

/// Each term as forks-only, unqualified and non-forks.
pub fn query_variants(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .flat_map(|term| {
            [
                format!("{term} fork:true"),
                term.clone(),
                format!("{term} fork:false"),
            ]
        })
        .collect()
}

/// Windowed, throttle-aware search that streams hits into a channel.
pub struct RepoSearcher<'a, C: ?Sized> {
    client: &'a C,
    options: SearchOptions,
}

impl<'a, C: HostingClient + ?Sized> RepoSearcher<'a, C> {
    pub fn new(client: &'a C, options: SearchOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Search every term variant over `[start, end)`.
    ///
    /// A query that fails with anything but throttling is logged and
    /// skipped; the remaining queries still run. Returns early if `tx`'s
    /// receiver goes away.
    #[tracing::instrument(skip(self, tx))]
    pub async fn search_repositories(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tx: &mpsc::Sender<SearchHit>,
    ) -> SearchReport {
        let mut report = SearchReport::default();
        let windows = search_windows(start, end, self.options.window_days);
        if windows.is_empty() {
            tracing::info!("empty search range");
            return report;
        }

        for variant in query_variants(&self.options.terms) {
            for window in &windows {
                let query = format!("{variant} {}", window.qualifier());
                report.queries += 1;
                tracing::info!(%query, "starting search");

                match self.run_query(&query, &variant, tx, &mut report).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Closed) => {
                        tracing::warn!("hit consumer went away, stopping search");
                        return report;
                    }
                    Err(e) => {
                        tracing::error!(
                            %query,
                            error = %short_error_message(&e),
                            "search query failed"
                        );
                        report.failed.push(FailedQuery {
                            query,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            queries = report.queries,
            hits = report.hits,
            failed = report.failed.len(),
            "repository search finished"
        );
        report
    }

    async fn run_query(
        &self,
        query: &str,
        provenance: &str,
        tx: &mpsc::Sender<SearchHit>,
        report: &mut SearchReport,
    ) -> Result<Flow, PlatformError> {
        let per_page = self.options.per_page;
        let mut page = 1;
        let mut seen = 0u64;

        loop {
            let resp = with_throttle_retry(
                || self.client.search_repositories(query, page, per_page),
                &self.options.throttle,
                query,
            )
            .await?;
            report.pages += 1;

            let ApiResponse { data, rate_limit } = resp;
            let SearchPage {
                total_count, items, ..
            } = data;
            let returned = items.len();
            tracing::debug!(query, page, returned, total_count, "search page");

            for repo in items {
                let hit = SearchHit {
                    repo,
                    query: provenance.to_string(),
                };
                if tx.send(hit).await.is_err() {
                    return Ok(Flow::Closed);
                }
                report.hits += 1;
            }
            seen += returned as u64;

            self.pace(rate_limit.as_ref()).await;

            if returned < per_page as usize || seen >= total_count.min(self.options.max_results) {
                return Ok(Flow::Continue);
            }
            page += 1;
        }
    }

    /// Run every code query, fetching each distinct repository once.
    #[tracing::instrument(skip(self, tx))]
    pub async fn search_code(&self, tx: &mpsc::Sender<SearchHit>) -> SearchReport {
        let mut report = SearchReport::default();
        let mut fetched = HashSet::new();

        for query in &self.options.code_queries {
            report.queries += 1;
            tracing::info!(%query, "starting code search");

            match self.code_query(query, &mut fetched, tx, &mut report).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Closed) => {
                    tracing::warn!("hit consumer went away, stopping code search");
                    return report;
                }
                Err(e) => {
                    tracing::error!(
                        %query,
                        error = %short_error_message(&e),
                        "code search failed"
                    );
                    report.failed.push(FailedQuery {
                        query: query.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            queries = report.queries,
            repositories = fetched.len(),
            failed = report.failed.len(),
            "code search finished"
        );
        report
    }

    async fn code_query(
        &self,
        query: &str,
        fetched: &mut HashSet<String>,
        tx: &mpsc::Sender<SearchHit>,
        report: &mut SearchReport,
    ) -> Result<Flow, PlatformError> {
        let per_page = self.options.per_page;
        let mut page = 1;
        let mut seen = 0u64;

        loop {
            let resp = with_throttle_retry(
                || self.client.search_code(query, page, per_page),
                &self.options.throttle,
                query,
            )
            .await?;
            report.pages += 1;
            self.pace(resp.rate_limit.as_ref()).await;

            let total_count = resp.data.total_count;
            let returned = resp.data.items.len();
            for full_name in resp.data.items {
                if !fetched.insert(full_name.clone()) {
                    continue;
                }
                let Some(repo) = self.fetch_repo(&full_name).await else {
                    continue;
                };
                let hit = SearchHit {
                    repo,
                    query: query.to_string(),
                };
                if tx.send(hit).await.is_err() {
                    return Ok(Flow::Closed);
                }
                report.hits += 1;
            }
            seen += returned as u64;

            if returned < per_page as usize || seen >= total_count.min(self.options.max_results) {
                return Ok(Flow::Continue);
            }
            page += 1;
        }
    }

    /// Fetch one repository, logging and swallowing anything but success.
    async fn fetch_repo(&self, full_name: &str) -> Option<RepoMetadata> {
        match with_throttle_retry(
            || self.client.get_repo(full_name),
            &self.options.throttle,
            full_name,
        )
        .await
        {
            Ok(resp) => {
                self.pace(resp.rate_limit.as_ref()).await;
                Some(resp.data)
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(repo = %full_name, "code hit points at a missing repository");
                None
            }
            Err(e) => {
                tracing::error!(
                    repo = %full_name,
                    error = %short_error_message(&e),
                    "could not fetch repository"
                );
                None
            }
        }
    }

    async fn pace(&self, rate_limit: Option<&RateLimitInfo>) {
        if let Some(info) = rate_limit {
            wait_for_quota(info, self.options.quota_margin).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::time::Instant;

    use super::*;
    use crate::platform::Result;

    pub(crate) fn meta(full_name: &str) -> RepoMetadata {
        let (username, repo_name) = full_name.split_once('/').unwrap();
        RepoMetadata {
            full_name: full_name.to_string(),
            repo_name: repo_name.to_string(),
            username: username.to_string(),
            fork: false,
            user_type: None,
            user_avatar_url: None,
            description: None,
            forks: None,
            created_at: None,
            updated_at: None,
            pushed_at: None,
            clone_url: Some(format!("https://github.com/{full_name}.git")),
            homepage: None,
            size: None,
            stargazers_count: None,
            watchers: None,
            language: None,
            open_issues: None,
            license: None,
            topics: Vec::new(),
        }
    }

    type Scripted<T> = Result<ApiResponse<T>>;

    /// Hosting client that replays scripted responses per query, in order.
    /// Unscripted calls return an empty page or not-found.
    #[derive(Default)]
    pub(crate) struct FakeHost {
        pub repo_pages: Mutex<HashMap<String, VecDeque<Scripted<SearchPage<RepoMetadata>>>>>,
        pub code_pages: Mutex<HashMap<String, VecDeque<Scripted<SearchPage<String>>>>>,
        pub repos: Mutex<HashMap<String, VecDeque<Scripted<RepoMetadata>>>>,
        pub calls: Mutex<Vec<(String, Instant)>>,
    }

    pub(crate) fn found(full_name: &str) -> Scripted<RepoMetadata> {
        Ok(ApiResponse {
            data: meta(full_name),
            rate_limit: None,
        })
    }

    pub(crate) fn page<T>(total: u64, items: Vec<T>) -> Scripted<SearchPage<T>> {
        Ok(ApiResponse {
            data: SearchPage {
                total_count: total,
                incomplete_results: false,
                items,
            },
            rate_limit: None,
        })
    }

    impl FakeHost {
        pub(crate) fn script_search(
            &self,
            query: &str,
            responses: Vec<Scripted<SearchPage<RepoMetadata>>>,
        ) {
            self.repo_pages
                .lock()
                .unwrap()
                .insert(query.to_string(), responses.into());
        }

        pub(crate) fn script_code(
            &self,
            query: &str,
            responses: Vec<Scripted<SearchPage<String>>>,
        ) {
            self.code_pages
                .lock()
                .unwrap()
                .insert(query.to_string(), responses.into());
        }

        pub(crate) fn script_repo(&self, full_name: &str, responses: Vec<Scripted<RepoMetadata>>) {
            self.repos
                .lock()
                .unwrap()
                .insert(full_name.to_string(), responses.into());
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push((call, Instant::now()));
        }
    }

    #[async_trait]
    impl HostingClient for FakeHost {
        async fn search_repositories(
            &self,
            query: &str,
            page_no: u32,
            _per_page: u32,
        ) -> Result<ApiResponse<SearchPage<RepoMetadata>>> {
            self.record(format!("search {query} p{page_no}"));
            let next = self
                .repo_pages
                .lock()
                .unwrap()
                .get_mut(query)
                .and_then(VecDeque::pop_front);
            next.unwrap_or_else(|| page(0, Vec::new()))
        }

        async fn search_code(
            &self,
            query: &str,
            page_no: u32,
            _per_page: u32,
        ) -> Result<ApiResponse<SearchPage<String>>> {
            self.record(format!("code {query} p{page_no}"));
            let next = self
                .code_pages
                .lock()
                .unwrap()
                .get_mut(query)
                .and_then(VecDeque::pop_front);
            next.unwrap_or_else(|| page(0, Vec::new()))
        }

        async fn get_repo(&self, full_name: &str) -> Result<ApiResponse<RepoMetadata>> {
            self.record(format!("repo {full_name}"));
            let next = self
                .repos
                .lock()
                .unwrap()
                .get_mut(full_name)
                .and_then(VecDeque::pop_front);
            next.unwrap_or_else(|| Err(PlatformError::not_found(full_name)))
        }
    }

    fn options(per_page: u32) -> SearchOptions {
        SearchOptions {
            terms: vec!["mojo".to_string()],
            code_queries: vec!["extension:mojo".to_string()],
            window_days: 20,
            per_page,
            max_results: 1000,
            throttle: ThrottleRetry::new(Duration::from_secs(1800), 3),
            quota_margin: Duration::from_secs(1),
        }
    }

    fn one_window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 5, 21).unwrap(),
        )
    }

    const WINDOW: &str = "created:2023-05-01..2023-05-20";

    async fn drain(mut rx: mpsc::Receiver<SearchHit>) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Some(hit) = rx.recv().await {
            out.push((hit.repo.full_name, hit.query));
        }
        out
    }

    #[test]
    fn variants_cover_fork_inclusion() {
        let variants = query_variants(&["mojo".to_string()]);
        assert_eq!(variants, ["mojo fork:true", "mojo", "mojo fork:false"]);
    }

    #[test]
    fn options_cap_page_size() {
        let options = SearchOptions::from_settings(&SearchSettings {
            per_page: 500,
            ..Default::default()
        });
        assert_eq!(options.per_page, 100);
        assert_eq!(options.max_results, 1000);
    }

    #[tokio::test]
    async fn paginates_until_short_page_and_tags_provenance() {
        let host = FakeHost::default();
        let query = format!("mojo {WINDOW}");
        host.script_search(
            &query,
            vec![
                page(3, vec![meta("a/one"), meta("a/two")]),
                page(3, vec![meta("a/three")]),
            ],
        );

        let (tx, rx) = mpsc::channel(16);
        let (start, end) = one_window();
        let report = RepoSearcher::new(&host, options(2))
            .search_repositories(start, end, &tx)
            .await;
        drop(tx);

        let hits = drain(rx).await;
        assert_eq!(
            hits,
            [
                ("a/one".to_string(), "mojo".to_string()),
                ("a/two".to_string(), "mojo".to_string()),
                ("a/three".to_string(), "mojo".to_string()),
            ]
        );
        assert_eq!(report.queries, 3);
        assert_eq!(report.hits, 3);
        assert!(host.calls().contains(&format!("search {query} p2")));
        assert!(!host.calls().contains(&format!("search {query} p3")));
    }

    #[tokio::test]
    async fn stops_at_result_cap() {
        let host = FakeHost::default();
        let query = format!("mojo fork:true {WINDOW}");
        host.script_search(
            &query,
            vec![
                page(5000, vec![meta("a/one")]),
                page(5000, vec![meta("a/two")]),
                page(5000, vec![meta("a/three")]),
            ],
        );

        let mut opts = options(1);
        opts.max_results = 2;
        let (tx, rx) = mpsc::channel(16);
        let (start, end) = one_window();
        RepoSearcher::new(&host, opts)
            .search_repositories(start, end, &tx)
            .await;
        drop(tx);

        assert_eq!(drain(rx).await.len(), 2);
    }

    #[tokio::test]
    async fn provider_error_aborts_only_that_query() {
        let host = FakeHost::default();
        host.script_search(
            &format!("mojo fork:true {WINDOW}"),
            vec![Err(PlatformError::api(422, "Validation Failed"))],
        );
        let forks_excluded = format!("mojo fork:false {WINDOW}");
        host.script_search(&forks_excluded, vec![page(1, vec![meta("b/fork")])]);

        let (tx, rx) = mpsc::channel(16);
        let (start, end) = one_window();
        let report = RepoSearcher::new(&host, options(100))
            .search_repositories(start, end, &tx)
            .await;
        drop(tx);

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].query.starts_with("mojo fork:true"));
        assert_eq!(
            drain(rx).await,
            [("b/fork".to_string(), "mojo fork:false".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_page_is_retried_after_pause() {
        let host = FakeHost::default();
        let query = format!("mojo {WINDOW}");
        host.script_search(
            &query,
            vec![
                Err(PlatformError::SecondaryRateLimited { retry_after: None }),
                page(1, vec![meta("a/one")]),
            ],
        );

        let (tx, rx) = mpsc::channel(16);
        let (start, end) = one_window();
        let report = RepoSearcher::new(&host, options(100))
            .search_repositories(start, end, &tx)
            .await;
        drop(tx);

        assert!(report.failed.is_empty());
        assert_eq!(drain(rx).await.len(), 1);

        let calls = host.calls.lock().unwrap();
        let prefix = format!("search {query} ");
        let attempts: Vec<_> = calls
            .iter()
            .filter(|(c, _)| c.starts_with(&prefix))
            .collect();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1].1 - attempts[0].1 >= Duration::from_secs(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_quota_waits_for_reset() {
        let host = FakeHost::default();
        let query = format!("mojo {WINDOW}");
        let exhausted = RateLimitInfo {
            limit: 30,
            remaining: 0,
            reset_at: Utc::now() + chrono::Duration::seconds(5),
        };
        host.script_search(
            &query,
            vec![
                Ok(ApiResponse {
                    data: SearchPage {
                        total_count: 2,
                        incomplete_results: false,
                        items: vec![meta("a/one")],
                    },
                    rate_limit: Some(exhausted),
                }),
                page(2, vec![meta("a/two")]),
            ],
        );

        let (tx, rx) = mpsc::channel(16);
        let (start, end) = one_window();
        RepoSearcher::new(&host, options(1))
            .search_repositories(start, end, &tx)
            .await;
        drop(tx);
        assert_eq!(drain(rx).await.len(), 2);

        let calls = host.calls.lock().unwrap();
        let sent_at = |call: String| calls.iter().find(|(c, _)| *c == call).map(|(_, at)| *at);
        let first = sent_at(format!("search {query} p1")).unwrap();
        let second = sent_at(format!("search {query} p2")).unwrap();
        assert!(second - first >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn code_search_fetches_each_repository_once() {
        let host = FakeHost::default();
        let names = ["a/one", "a/one", "gone/repo"].map(String::from);
        host.script_code("extension:mojo", vec![page(3, names.to_vec())]);
        host.script_repo("a/one", vec![found("a/one")]);

        let (tx, rx) = mpsc::channel(16);
        let report = RepoSearcher::new(&host, options(100))
            .search_code(&tx)
            .await;
        drop(tx);

        assert_eq!(
            drain(rx).await,
            [("a/one".to_string(), "extension:mojo".to_string())]
        );
        assert_eq!(report.hits, 1);
        let fetches = host
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("repo "))
            .count();
        assert_eq!(fetches, 2);
    }

    #[tokio::test]
    async fn closed_consumer_stops_search() {
        let host = FakeHost::default();
        let forks_included = format!("mojo fork:true {WINDOW}");
        host.script_search(&forks_included, vec![page(1, vec![meta("a/one")])]);

        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let (start, end) = one_window();
        let report = RepoSearcher::new(&host, options(100))
            .search_repositories(start, end, &tx)
            .await;

        assert_eq!(report.hits, 0);
        assert_eq!(report.queries, 1);
    }
}
