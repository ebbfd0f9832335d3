use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use crossbeam_channel::Receiver;
use sea_orm::DatabaseConnection;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::config::StatsSettings;
use crate::git::GitRunner;
use crate::repository;

use super::StatsError;
use super::files::{FileCounts, count_code_files};
use super::log_parse::{CommitStats, count_commit_lines, parse_stat_log, self_test};

/// Everything measured for one mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Lifetime commits across all refs. `None` when git could not tell.
    pub commits: Option<u64>,
    /// Changes inside the stats window.
    pub changes: CommitStats,
    pub files: FileCounts,
}

#[derive(Debug, Clone)]
pub struct StatsOptions {
    pub workers: usize,
    pub window_days: u32,
    pub log_timeout: Duration,
    pub include_blacklisted: bool,
}

impl StatsOptions {
    pub fn from_settings(settings: &StatsSettings) -> Self {
        let workers = if settings.max_process == 0 {
            default_workers()
        } else {
            settings.max_process
        };
        Self {
            workers,
            window_days: settings.window_days,
            log_timeout: Duration::from_secs(settings.log_timeout_secs),
            include_blacklisted: false,
        }
    }
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self::from_settings(&StatsSettings::default())
    }
}

/// Two thirds of the available CPUs, at least one.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    (cpus * 2 / 3).max(1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub mirrors: usize,
    pub updated: usize,
    pub write_failures: usize,
}

/// Recomputes file counts and commit activity for every mirror.
pub struct StatsExtractor<R> {
    db: Arc<DatabaseConnection>,
    runner: Arc<R>,
    options: StatsOptions,
}

impl<R: GitRunner + 'static> StatsExtractor<R> {
    pub fn new(db: Arc<DatabaseConnection>, runner: Arc<R>, options: StatsOptions) -> Self {
        Self { db, runner, options }
    }

    #[tracing::instrument(skip(self), fields(workers = self.options.workers))]
    pub async fn run(&self) -> Result<StatsReport, StatsError> {
        self_test()?;

        let paths = repository::mirror_paths(&self.db, self.options.include_blacklisted).await?;
        let mut report = StatsReport {
            mirrors: paths.len(),
            ..Default::default()
        };
        if paths.is_empty() {
            tracing::info!("no mirrors to measure");
            return Ok(report);
        }
        tracing::info!(mirrors = paths.len(), "computing mirror stats");

        let (tx, rx) = crossbeam_channel::unbounded();
        for path in paths {
            // The receiver is alive, so sending cannot fail.
            let _ = tx.send(path);
        }
        drop(tx);

        let since = window_start(Utc::now().date_naive(), self.options.window_days);
        let handle = Handle::current();
        let mut workers = JoinSet::new();

        for id in 0..self.options.workers.max(1) {
            let worker = Worker {
                id,
                queue: rx.clone(),
                handle: handle.clone(),
                db: Arc::clone(&self.db),
                runner: Arc::clone(&self.runner),
                since,
                log_timeout: self.options.log_timeout,
            };
            workers.spawn_blocking(move || worker.drain());
        }
        drop(rx);

        while let Some(joined) = workers.join_next().await {
            let (updated, failed) = joined?;
            report.updated += updated;
            report.write_failures += failed;
        }

        tracing::info!(
            updated = report.updated,
            write_failures = report.write_failures,
            "mirror stats finished"
        );
        Ok(report)
    }
}

/// First day of a `days`-long window ending today.
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - chrono::Days::new(u64::from(days))
}

struct Worker<R> {
    id: usize,
    queue: Receiver<String>,
    handle: Handle,
    db: Arc<DatabaseConnection>,
    runner: Arc<R>,
    since: NaiveDate,
    log_timeout: Duration,
}

impl<R: GitRunner> Worker<R> {
    /// Process mirrors until the queue is empty. Returns (updated, failed).
    fn drain(self) -> (usize, usize) {
        let mut updated = 0;
        let mut failed = 0;

        while let Ok(path) = self.queue.recv() {
            let stats = self.measure(Path::new(&path));
            match self
                .handle
                .block_on(repository::record_mirror_stats(&self.db, &path, &stats))
            {
                Ok(_) => {
                    tracing::debug!(
                        worker = self.id,
                        path = %path,
                        files = stats.files.total_files(),
                        "recorded mirror stats"
                    );
                    updated += 1;
                }
                Err(e) => {
                    tracing::error!(
                        worker = self.id,
                        path = %path,
                        error = %e,
                        "failed to record mirror stats"
                    );
                    failed += 1;
                }
            }
        }

        tracing::debug!(worker = self.id, updated, failed, "stats worker done");
        (updated, failed)
    }

    fn measure(&self, path: &Path) -> MirrorStats {
        let runner = self.runner.as_ref();
        MirrorStats {
            commits: self
                .handle
                .block_on(total_commits(runner, path, self.log_timeout)),
            changes: self
                .handle
                .block_on(repo_changes(runner, path, self.since, self.log_timeout)),
            files: count_code_files(path),
        }
    }
}

/// Changes on every ref since `since`. Git failures yield empty stats.
pub async fn repo_changes<R: GitRunner + ?Sized>(
    runner: &R,
    repo: &Path,
    since: NaiveDate,
    timeout: Duration,
) -> CommitStats {
    let after = format!("--after={}", since.format("%Y-%m-%d"));
    let args = [
        "--no-pager",
        "log",
        "--stat",
        "--all",
        "--no-color",
        after.as_str(),
    ];
    match runner.run(Some(repo), &args, timeout).await {
        Ok(log) => parse_stat_log(&log),
        Err(e) => {
            tracing::warn!(path = %repo.display(), error = %e, "could not read change log");
            CommitStats::default()
        }
    }
}

/// Lifetime commit count across every ref.
pub async fn total_commits<R: GitRunner + ?Sized>(
    runner: &R,
    repo: &Path,
    timeout: Duration,
) -> Option<u64> {
    let args = ["--no-pager", "log", "--oneline", "--all", "--no-color"];
    match runner.run(Some(repo), &args, timeout).await {
        Ok(log) => Some(count_commit_lines(&log)),
        Err(e) => {
            tracing::warn!(path = %repo.display(), error = %e, "could not count commits");
            None
        }
    }
}
