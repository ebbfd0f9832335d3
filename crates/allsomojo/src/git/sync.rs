//! Clone missing mirrors and pull stale ones.
//!
//! Git work is I/O bound, so units run as tokio tasks gated by a semaphore
//! of `max_git_io` permits, with a short stagger between submissions so a
//! large batch does not open every connection to the host at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::sync::Semaphore;

use crate::config::GitSettings;
use crate::repository::{self, CatalogError};

use super::error::{CloneError, PullError};
use super::runner::GitRunner;

#[derive(Debug, Clone)]
pub struct GitSyncOptions {
    pub repos_base_dir: PathBuf,
    pub max_git_io: usize,
    pub stagger: Duration,
    pub pull_timeout: Duration,
    pub clone_timeout: Duration,
    /// Extra passes over the clones that failed.
    pub clone_retries: u32,
    pub include_blacklisted: bool,
}

impl GitSyncOptions {
    pub fn new(repos_base_dir: impl Into<PathBuf>) -> Self {
        Self::from_settings(&GitSettings::default(), repos_base_dir)
    }

    pub fn from_settings(settings: &GitSettings, repos_base_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_base_dir: repos_base_dir.into(),
            max_git_io: settings.max_git_io.max(1),
            stagger: Duration::from_millis(settings.stagger_ms),
            pull_timeout: Duration::from_secs(settings.pull_timeout_secs),
            clone_timeout: Duration::from_secs(settings.clone_timeout_secs),
            clone_retries: settings.clone_retries,
            include_blacklisted: false,
        }
    }
}

/// One unit that did not make it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// `owner/name` for clones, the mirror path for pulls.
    pub repo: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub succeeded: usize,
    /// Existing working copies adopted without cloning.
    pub self_healed: usize,
    pub failed: Vec<SyncFailure>,
    /// Passes made over the batch.
    pub attempts: u32,
}

#[derive(Debug, Clone)]
struct CloneJob {
    full_name: String,
    clone_url: String,
    target: PathBuf,
}

/// `<base>/<owner>/<name>` for an `owner/name` pair.
pub fn clone_target(base: &Path, full_name: &str) -> Result<PathBuf, CloneError> {
    let invalid = || CloneError::InvalidName {
        full_name: full_name.to_string(),
    };
    let (owner, name) = full_name.split_once('/').ok_or_else(invalid)?;
    let safe = |part: &str| {
        !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
    };
    if !safe(owner) || !safe(name) {
        return Err(invalid());
    }
    Ok(base.join(owner).join(name))
}

/// A directory with a `.git` subdirectory inside.
pub fn is_working_copy(path: &Path) -> bool {
    path.is_dir() && path.join(".git").is_dir()
}

/// Validate `path` and record it as the mirror for `full_name`.
async fn adopt_working_copy(
    db: &DatabaseConnection,
    full_name: &str,
    path: &Path,
) -> Result<(), CloneError> {
    if !is_working_copy(path) {
        return Err(CloneError::InvalidWorkingCopy {
            path: path.to_path_buf(),
        });
    }
    let absolute = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| CloneError::io(path, e))?;
    repository::set_local_path(db, full_name, &absolute.to_string_lossy()).await?;
    Ok(())
}

/// Remove what a failed clone left behind so the next pass starts clean.
async fn discard_partial_clone(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial clone"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not remove partial clone")
        }
    }
}

async fn clone_one<R: GitRunner + ?Sized>(
    runner: &R,
    db: &DatabaseConnection,
    job: &CloneJob,
    timeout: Duration,
) -> Result<(), CloneError> {
    // A previous pass cloned it but could not record it.
    if is_working_copy(&job.target) {
        return adopt_working_copy(db, &job.full_name, &job.target).await;
    }

    if let Some(parent) = job.target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CloneError::io(parent, e))?;
    }

    let target = job.target.to_string_lossy();
    let args = ["clone", "--quiet", job.clone_url.as_str(), &*target];
    if let Err(e) = runner.run(None, &args, timeout).await {
        discard_partial_clone(&job.target).await;
        return Err(e.into());
    }

    let adopted = adopt_working_copy(db, &job.full_name, &job.target).await;
    if let Err(CloneError::InvalidWorkingCopy { .. }) = adopted {
        discard_partial_clone(&job.target).await;
    }
    adopted
}

async fn pull_one<R: GitRunner + ?Sized>(
    runner: &R,
    db: &DatabaseConnection,
    path: &str,
    timeout: Duration,
) -> Result<(), PullError> {
    runner
        .run(Some(Path::new(path)), &["pull", "--quiet"], timeout)
        .await?;
    repository::mark_pulled(db, path, Utc::now()).await?;
    Ok(())
}

/// Clone/pull orchestrator over the catalog's mirror state.
pub struct GitSync<R> {
    db: Arc<DatabaseConnection>,
    runner: Arc<R>,
    options: GitSyncOptions,
}

impl<R: GitRunner + 'static> GitSync<R> {
    pub fn new(db: Arc<DatabaseConnection>, runner: Arc<R>, options: GitSyncOptions) -> Self {
        Self { db, runner, options }
    }

    /// Pull every mirror whose host saw a push after our last pull.
    ///
    /// Failures are logged and reported, not retried: the entry stays stale
    /// and is picked up again next run.
    #[tracing::instrument(skip(self))]
    pub async fn pull_stale(&self) -> Result<SyncReport, CatalogError> {
        let paths = repository::pull_candidates(&self.db, self.options.include_blacklisted).await?;
        let mut report = SyncReport {
            attempts: 1,
            ..Default::default()
        };
        if paths.is_empty() {
            tracing::info!("no stale mirrors");
            return Ok(report);
        }
        tracing::info!(count = paths.len(), "pulling stale mirrors");

        let semaphore = Arc::new(Semaphore::new(self.options.max_git_io));
        let mut handles = Vec::with_capacity(paths.len());

        for (i, path) in paths.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.options.stagger).await;
            }
            let semaphore = Arc::clone(&semaphore);
            let runner = Arc::clone(&self.runner);
            let db = Arc::clone(&self.db);
            let timeout = self.options.pull_timeout;
            let task_path = path.clone();

            let handle = tokio::spawn(async move {
                match semaphore.acquire().await {
                    Ok(_permit) => pull_one(runner.as_ref(), &db, &task_path, timeout).await,
                    Err(_) => Err(PullError::Catalog(CatalogError::invalid_input(
                        "git semaphore closed unexpectedly",
                    ))),
                }
            });
            handles.push((path, handle));
        }

        for (path, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| Err(PullError::Task(e)));
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "pull failed");
                    report.failed.push(SyncFailure {
                        repo: path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "pull pass finished"
        );
        Ok(report)
    }

    /// Create mirrors for entries that have none.
    ///
    /// A target directory that already exists is adopted if it is a working
    /// copy and reported as a failure otherwise; it is never overwritten.
    /// Failed clones are retried as a batch up to `clone_retries` times.
    #[tracing::instrument(skip(self))]
    pub async fn clone_missing(&self) -> Result<SyncReport, CatalogError> {
        let candidates =
            repository::clone_candidates(&self.db, self.options.include_blacklisted).await?;
        let mut report = SyncReport::default();
        let mut pending = Vec::new();

        for candidate in candidates {
            let target = match clone_target(&self.options.repos_base_dir, &candidate.full_name) {
                Ok(target) => target,
                Err(e) => {
                    record_failure(&mut report, &candidate.full_name, &e);
                    continue;
                }
            };

            if target.exists() {
                match adopt_working_copy(&self.db, &candidate.full_name, &target).await {
                    Ok(()) => {
                        tracing::info!(
                            repo = %candidate.full_name,
                            path = %target.display(),
                            "adopted existing working copy"
                        );
                        report.self_healed += 1;
                    }
                    Err(e) => record_failure(&mut report, &candidate.full_name, &e),
                }
                continue;
            }

            match candidate.clone_url {
                Some(clone_url) => pending.push(CloneJob {
                    full_name: candidate.full_name,
                    clone_url,
                    target,
                }),
                None => record_failure(
                    &mut report,
                    &candidate.full_name,
                    &CloneError::MissingCloneUrl,
                ),
            }
        }

        if pending.is_empty() {
            tracing::info!(self_healed = report.self_healed, "nothing to clone");
            return Ok(report);
        }

        loop {
            report.attempts += 1;
            tracing::info!(
                count = pending.len(),
                attempt = report.attempts,
                "cloning mirrors"
            );

            let failures = self.clone_batch(pending).await;
            report.succeeded += failures.succeeded;

            if failures.failed.is_empty() {
                break;
            }
            if report.attempts > self.options.clone_retries {
                for (job, e) in &failures.failed {
                    record_failure(&mut report, &job.full_name, e);
                }
                break;
            }

            tracing::warn!(
                failed = failures.failed.len(),
                attempt = report.attempts,
                "retrying failed clones"
            );
            pending = failures.failed.into_iter().map(|(job, _)| job).collect();
        }

        tracing::info!(
            succeeded = report.succeeded,
            self_healed = report.self_healed,
            failed = report.failed.len(),
            "clone pass finished"
        );
        Ok(report)
    }

    async fn clone_batch(&self, jobs: Vec<CloneJob>) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.options.max_git_io));
        let mut handles = Vec::with_capacity(jobs.len());

        for (i, job) in jobs.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.options.stagger).await;
            }
            let semaphore = Arc::clone(&semaphore);
            let runner = Arc::clone(&self.runner);
            let db = Arc::clone(&self.db);
            let timeout = self.options.clone_timeout;
            let task_job = job.clone();

            let handle = tokio::spawn(async move {
                match semaphore.acquire().await {
                    Ok(_permit) => clone_one(runner.as_ref(), &db, &task_job, timeout).await,
                    Err(_) => Err(CloneError::Catalog(CatalogError::invalid_input(
                        "git semaphore closed unexpectedly",
                    ))),
                }
            });
            handles.push((job, handle));
        }

        let mut outcome = BatchOutcome::default();
        for (job, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| Err(CloneError::Task(e)));
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    tracing::warn!(repo = %job.full_name, error = %e, "clone attempt failed");
                    outcome.failed.push((job, e));
                }
            }
        }
        outcome
    }
}

#[derive(Default)]
struct BatchOutcome {
    succeeded: usize,
    failed: Vec<(CloneJob, CloneError)>,
}

fn record_failure(report: &mut SyncReport, full_name: &str, error: &CloneError) {
    tracing::error!(repo = %full_name, error = %error, "clone failed");
    report.failed.push(SyncFailure {
        repo: full_name.to_string(),
        reason: error.to_string(),
    });
}
