//! [`Vcs`] over the `git` command-line tool.
//!
//! Every invocation runs in the repository root with stdin closed, terminal
//! prompts disabled and a per-operation timeout.  A child still running when
//! its timeout expires is killed; the timeout is reported as that operation's
//! failure.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{DiffSummary, LastCommit, Scope, Vcs, VcsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GitTimeouts {
    status: Duration,
    stage: Duration,
    diff: Duration,
    commit: Duration,
    push: Duration,
}

impl Default for GitTimeouts {
    fn default() -> Self {
        Self {
            status: Duration::from_secs(5),
            stage: Duration::from_secs(10),
            diff: Duration::from_secs(10),
            commit: Duration::from_secs(10),
            push: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
    timeouts: GitTimeouts,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeouts: GitTimeouts::default(),
        }
    }

    async fn run<I, S>(&self, op: &'static str, args: I, timeout: Duration) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args)
            .current_dir(&self.repo_root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| VcsError::TimedOut { op, after: timeout })?
            .map_err(|source| VcsError::Spawn { op, source })?;

        if output.status.success() {
            debug!(op, "git succeeded");
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(VcsError::Failed {
                op,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Appends `-- <path>` when the scope names a single path.
fn with_scope(mut args: Vec<String>, scope: &Scope) -> Vec<String> {
    if let Some(path) = scope.path() {
        args.push("--".to_string());
        args.push(path.to_string());
    }
    args
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}

#[async_trait]
impl Vcs for GitCli {
    async fn short_status(&self, scope: &Scope) -> Result<Vec<String>, VcsError> {
        let args = with_scope(owned(&["status", "--porcelain"]), scope);
        let out = self.run("status", args, self.timeouts.status).await?;
        Ok(out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect())
    }

    async fn stage(&self, paths: &[String]) -> Result<(), VcsError> {
        let mut args = owned(&["add", "--"]);
        args.extend(paths.iter().cloned());
        self.run("add", args, self.timeouts.stage).await?;
        Ok(())
    }

    async fn stage_all(&self) -> Result<(), VcsError> {
        self.run("add", ["add", "-A"], self.timeouts.stage).await?;
        Ok(())
    }

    async fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError> {
        let mut args = owned(&["commit", "-m", message]);
        if !paths.is_empty() {
            args.push("--".to_string());
            args.extend(paths.iter().cloned());
        }
        self.run("commit", args, self.timeouts.commit).await?;
        Ok(())
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.run("push", ["push"], self.timeouts.push).await?;
        Ok(())
    }

    async fn diff_numstat(&self, scope: &Scope) -> Result<DiffSummary, VcsError> {
        let args = with_scope(owned(&["diff", "--numstat", "HEAD"]), scope);
        let out = self.run("diff", args, self.timeouts.diff).await?;
        Ok(DiffSummary::parse_numstat(&out))
    }

    async fn diff_text(&self, scope: &Scope, cached: bool) -> Result<String, VcsError> {
        let base = if cached { owned(&["diff", "--cached"]) } else { owned(&["diff"]) };
        let out = self.run("diff", with_scope(base, scope), self.timeouts.diff).await?;
        Ok(out.trim().to_string())
    }

    async fn current_branch(&self) -> Result<Option<String>, VcsError> {
        let out = self
            .run("branch", ["branch", "--show-current"], self.timeouts.status)
            .await?;
        let branch = out.trim();
        Ok(if branch.is_empty() { None } else { Some(branch.to_string()) })
    }

    async fn last_commit(&self) -> Result<Option<LastCommit>, VcsError> {
        let out = self
            .run("log", ["log", "-1", "--pretty=format:%s|||%ar"], self.timeouts.status)
            .await?;
        Ok(out.trim().split_once("|||").map(|(subject, age)| LastCommit {
            subject: subject.to_string(),
            age: age.to_string(),
        }))
    }

    async fn remote_url(&self) -> Result<Option<String>, VcsError> {
        let out = self.run("remote", ["remote", "-v"], self.timeouts.status).await?;
        Ok(parse_push_remote(&out))
    }
}

fn parse_push_remote(remote_v: &str) -> Option<String> {
    remote_v
        .lines()
        .filter(|line| line.contains("(push)"))
        .find_map(|line| line.split_whitespace().nth(1))
        .map(ToString::to_string)
}

// ── Tests ────────────────────────────────────────────────────────────────────
