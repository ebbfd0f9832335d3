//! One full catalog update.
//!
//! Stages run in order: repository and code search (hits streamed to a
//! writer task), refresh of entries the searches missed, pull of stale
//! mirrors, clone of missing ones, stats extraction, classification.

use std::fmt;
use std::sync::Arc;

use chrono::{Days, Utc};
use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::classify::{ClassifyReport, classify};
use crate::config::Settings;
use crate::git::{GitRunner, GitSync, GitSyncOptions, SyncReport};
use crate::platform::HostingClient;
use crate::repository::{self, CatalogError};
use crate::search::{
    RefreshReport, RepoSearcher, SearchOptions, SearchReport, WriterReport, await_catalog_writer,
    refresh_saved_repos, resume_date, spawn_catalog_writer,
};
use crate::stats::{StatsError, StatsExtractor, StatsOptions, StatsReport};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    /// Search from the epoch instead of the catalog watermark.
    pub from_start: bool,
    /// Refresh, sync and measure blacklisted entries too.
    pub include_blacklisted: bool,
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub search: SearchReport,
    pub writer: WriterReport,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub discovery: DiscoveryReport,
    pub refresh: RefreshReport,
    pub pull: SyncReport,
    pub clone: SyncReport,
    pub stats: StatsReport,
    pub classify: ClassifyReport,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "search: {} queries, {} hits, {} saved, {} failed queries",
            self.discovery.search.queries,
            self.discovery.search.hits,
            self.discovery.writer.saved,
            self.discovery.search.failed.len()
        )?;
        writeln!(
            f,
            "refresh: {} refreshed, {} not found, {} failed",
            self.refresh.refreshed, self.refresh.not_found, self.refresh.failed
        )?;
        writeln!(
            f,
            "pull: {} pulled, {} failed",
            self.pull.succeeded,
            self.pull.failed.len()
        )?;
        writeln!(
            f,
            "clone: {} cloned, {} adopted, {} failed after {} attempts",
            self.clone.succeeded,
            self.clone.self_healed,
            self.clone.failed.len(),
            self.clone.attempts
        )?;
        writeln!(
            f,
            "stats: {} of {} mirrors updated",
            self.stats.updated, self.stats.mirrors
        )?;
        write!(f, "classify: {}", self.classify)
    }
}

/// Search for new and updated repositories and persist every hit.
#[tracing::instrument(skip_all, fields(from_start = flags.from_start))]
pub async fn discover<C: HostingClient + ?Sized>(
    db: &Arc<DatabaseConnection>,
    client: &C,
    settings: &Settings,
    flags: RunFlags,
) -> Result<DiscoveryReport> {
    let epoch = settings.search.epoch;
    let start = if flags.from_start {
        epoch
    } else {
        let watermark = repository::search_watermark(db).await?;
        resume_date(watermark, settings.search.watermark_backoff_days, epoch)
    };
    // Exclusive bound, so today is searched too.
    let today = Utc::now().date_naive();
    let end = today.checked_add_days(Days::new(1)).unwrap_or(today);
    tracing::info!(%start, %end, "searching");

    let (tx, rx) = mpsc::channel(settings.search.channel_capacity.max(1));
    let writer = spawn_catalog_writer(Arc::clone(db), rx);

    let searcher = RepoSearcher::new(client, SearchOptions::from_settings(&settings.search));
    let mut search = searcher.search_repositories(start, end, &tx).await;
    search.merge(searcher.search_code(&tx).await);
    drop(tx);

    let writer = await_catalog_writer(writer).await;
    if writer.has_errors() {
        tracing::warn!(
            errors = writer.errors.len(),
            panicked = writer.panic_info.is_some(),
            "some hits were not saved"
        );
    }

    Ok(DiscoveryReport { search, writer })
}

/// Run every stage against the catalog at `db`.
///
/// Unit-level failures (a query, a clone, a mirror) are logged and show up
/// in the report; only catalog-level failures abort the run.
#[tracing::instrument(skip_all)]
pub async fn update_catalog<C, R>(
    db: &Arc<DatabaseConnection>,
    client: &C,
    runner: Arc<R>,
    settings: &Settings,
    flags: RunFlags,
) -> Result<PipelineReport>
where
    C: HostingClient + ?Sized,
    R: GitRunner + 'static,
{
    #[cfg(feature = "migrate")]
    {
        use sea_orm_migration::MigratorTrait;
        let conn: &DatabaseConnection = db;
        crate::migration::Migrator::up(conn, None).await?;
    }

    let Some(repos_base_dir) = settings.repos_base_dir() else {
        return Err(PipelineError::Config {
            message: "no mirror directory configured and no data directory available".to_string(),
        });
    };

    let run_started_at = Utc::now();
    let mut report = PipelineReport {
        discovery: discover(db, client, settings, flags).await?,
        ..Default::default()
    };

    let search_options = SearchOptions::from_settings(&settings.search);
    report.refresh = refresh_saved_repos(
        db,
        client,
        run_started_at,
        flags.include_blacklisted,
        &search_options.throttle,
        search_options.quota_margin,
    )
    .await?;

    let mut sync_options = GitSyncOptions::from_settings(&settings.git, repos_base_dir);
    sync_options.include_blacklisted = flags.include_blacklisted;
    let sync = GitSync::new(Arc::clone(db), Arc::clone(&runner), sync_options);
    report.pull = sync.pull_stale().await?;
    report.clone = sync.clone_missing().await?;

    let mut stats_options = StatsOptions::from_settings(&settings.stats);
    stats_options.include_blacklisted = flags.include_blacklisted;
    report.stats = StatsExtractor::new(Arc::clone(db), runner, stats_options)
        .run()
        .await?;

    report.classify = classify(db).await?;

    tracing::info!("catalog update finished");
    Ok(report)
}
