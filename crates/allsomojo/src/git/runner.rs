use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::GitError;

/// Runs `git` and returns its stdout.
///
/// `repo` becomes `git -C <repo>`. Implementations must enforce `timeout`
/// and make sure a timed-out child does not outlive the call.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(
        &self,
        repo: Option<&Path>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, GitError>;
}

/// The `git` binary on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(
        &self,
        repo: Option<&Path>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, GitError> {
        let command = args.join(" ");

        let mut cmd = Command::new("git");
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        tracing::trace!(repo = ?repo, %command, "running git");

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(output) => output.map_err(|source| GitError::Spawn { source })?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command,
                    after: timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(GitError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| GitError::Decode { command })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn reports_version() {
        if !git_available() {
            return;
        }
        let out = SystemGit
            .run(None, &["--version"], Duration::from_secs(10))
            .await
            .expect("git --version should succeed");
        assert!(out.starts_with("git version"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_with_stderr() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SystemGit
            .run(
                Some(dir.path()),
                &["log", "--oneline"],
                Duration::from_secs(10),
            )
            .await
            .expect_err("log outside a repository should fail");
        match err {
            GitError::Failed { command, stderr, .. } => {
                assert_eq!(command, "log --oneline");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
