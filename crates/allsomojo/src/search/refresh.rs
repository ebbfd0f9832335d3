use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::platform::{HostingClient, short_error_message, wait_for_quota};
use crate::repository::{self, CatalogError, DEFAULT_UPSERT_BACKOFF_MS, DEFAULT_UPSERT_RETRIES};
use crate::retry::{ThrottleRetry, with_throttle_retry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub candidates: usize,
    pub refreshed: usize,
    /// Entries the host no longer has, now marked "not found".
    pub not_found: usize,
    pub failed: usize,
}

/// Re-fetch every entry not crawled since `run_started_at`.
///
/// Entries found by this run's searches are already fresh and skipped. A
/// vanished repository is blacklisted unless it was manually checked.
#[tracing::instrument(skip(db, client, throttle))]
pub async fn refresh_saved_repos<C: HostingClient + ?Sized>(
    db: &DatabaseConnection,
    client: &C,
    run_started_at: DateTime<Utc>,
    include_blacklisted: bool,
    throttle: &ThrottleRetry,
    quota_margin: Duration,
) -> Result<RefreshReport, CatalogError> {
    let names = repository::refresh_candidates(db, run_started_at, include_blacklisted).await?;
    let mut report = RefreshReport {
        candidates: names.len(),
        ..Default::default()
    };
    tracing::info!(count = names.len(), "refreshing saved repositories");

    for full_name in names {
        match with_throttle_retry(|| client.get_repo(&full_name), throttle, &full_name).await {
            Ok(resp) => {
                if let Some(info) = &resp.rate_limit {
                    wait_for_quota(info, quota_margin).await;
                }
                match repository::save_hit_with_retry(
                    db,
                    &resp.data,
                    None,
                    Utc::now(),
                    DEFAULT_UPSERT_RETRIES,
                    DEFAULT_UPSERT_BACKOFF_MS,
                )
                .await
                {
                    Ok(()) => {
                        tracing::debug!(repo = %full_name, "refreshed");
                        report.refreshed += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            repo = %full_name,
                            error = %e,
                            "failed to save refreshed entry"
                        );
                        report.failed += 1;
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(repo = %full_name, "repository no longer exists");
                if repository::mark_not_found(db, &full_name).await? {
                    report.not_found += 1;
                }
            }
            Err(e) => {
                tracing::error!(
                    repo = %full_name,
                    error = %short_error_message(&e),
                    "refresh failed"
                );
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        refreshed = report.refreshed,
        not_found = report.not_found,
        failed = report.failed,
        "refresh finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;
    use crate::platform::PlatformError;
    use crate::search::searcher::tests::{FakeHost, found};

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn name_row(full_name: &str) -> BTreeMap<String, sea_orm::Value> {
        BTreeMap::from([("full_name".to_string(), sea_orm::Value::from(full_name))])
    }

    #[tokio::test]
    async fn refreshes_and_marks_vanished_entries() {
        let names = vec![name_row("a/live"), name_row("a/gone"), name_row("a/flaky")];
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([names])
            .append_exec_results([exec(1), exec(1)])
            .into_connection();

        let host = FakeHost::default();
        host.script_repo("a/live", vec![found("a/live")]);
        let reset = PlatformError::network("connection reset");
        host.script_repo("a/flaky", vec![Err(reset)]);

        let report = refresh_saved_repos(
            &db,
            &host,
            Utc::now(),
            false,
            &ThrottleRetry::new(Duration::from_millis(1), 1),
            Duration::ZERO,
        )
        .await
        .expect("refresh");

        assert_eq!(
            report,
            RefreshReport {
                candidates: 3,
                refreshed: 1,
                not_found: 1,
                failed: 1,
            }
        );
    }
}
