//! Background task that persists search hits as they stream in.
//!
//! ```text
//! searcher -> hit channel -> catalog writer -> database
//! ```
//!
//! Each hit is written on its own (provenance row, then the entry upsert)
//! with retries on transient database errors. Failures are collected rather
//! than stopping the stream.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::repository::{self, DEFAULT_UPSERT_BACKOFF_MS, DEFAULT_UPSERT_RETRIES};

use super::searcher::SearchHit;

/// What the writer managed to persist.
#[derive(Debug, Default)]
#[must_use = "WriterReport may contain errors that should be checked"]
pub struct WriterReport {
    pub saved: usize,
    /// `(full_name, error)` per hit that could not be written.
    pub errors: Vec<(String, String)>,
    /// Panic message if the task panicked.
    pub panic_info: Option<String>,
}

impl WriterReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.panic_info.is_some()
    }
}

/// Spawn a task writing every hit received on `rx` until all senders drop.
pub fn spawn_catalog_writer(
    db: Arc<DatabaseConnection>,
    mut rx: mpsc::Receiver<SearchHit>,
) -> JoinHandle<WriterReport> {
    tokio::spawn(async move {
        let mut report = WriterReport::default();
        tracing::debug!("catalog writer started");

        while let Some(hit) = rx.recv().await {
            match repository::save_hit_with_retry(
                &db,
                &hit.repo,
                Some(&hit.query),
                Utc::now(),
                DEFAULT_UPSERT_RETRIES,
                DEFAULT_UPSERT_BACKOFF_MS,
            )
            .await
            {
                Ok(()) => {
                    tracing::debug!(repo = %hit.repo.full_name, query = %hit.query, "saved hit");
                    report.saved += 1;
                }
                Err(e) => {
                    tracing::error!(repo = %hit.repo.full_name, error = %e, "failed to save hit");
                    report.errors.push((hit.repo.full_name, e.to_string()));
                }
            }
        }

        tracing::debug!(
            saved = report.saved,
            errors = report.errors.len(),
            "catalog writer finished"
        );
        report
    })
}

/// Await the writer, turning a panic into a report entry.
pub async fn await_catalog_writer(handle: JoinHandle<WriterReport>) -> WriterReport {
    match handle.await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "catalog writer panicked");
            WriterReport {
                panic_info: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};

    use super::*;
    use crate::search::searcher::tests::meta;

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn hit(full_name: &str) -> SearchHit {
        SearchHit {
            repo: meta(full_name),
            query: "mojo".to_string(),
        }
    }

    #[tokio::test]
    async fn saves_each_hit_until_channel_closes() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([exec(1), exec(1), exec(1), exec(1)])
            .into_connection();

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_catalog_writer(Arc::new(db), rx);
        tx.send(hit("a/one")).await.unwrap();
        tx.send(hit("a/two")).await.unwrap();
        drop(tx);

        let report = await_catalog_writer(handle).await;
        assert_eq!(report.saved, 2);
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn failures_are_collected_not_fatal() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_errors([DbErr::Custom("constraint violated".to_string())])
            .append_exec_results([exec(1), exec(1)])
            .into_connection();

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_catalog_writer(Arc::new(db), rx);
        tx.send(hit("a/bad")).await.unwrap();
        tx.send(hit("a/good")).await.unwrap();
        drop(tx);

        let report = await_catalog_writer(handle).await;
        assert_eq!(report.saved, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "a/bad");
    }
}
