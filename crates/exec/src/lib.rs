//! Version-control collaborator.
//!
//! The engine never touches the object store itself; it issues the handful of
//! logical operations below to an existing git installation and interprets
//! their results.  [`Vcs`] is the seam; [`GitCli`] drives the `git` binary.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod git;

pub use git::GitCli;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("could not run git {op}: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("git {op} timed out after {}s", .after.as_secs())]
    TimedOut { op: &'static str, after: Duration },

    #[error("git {op} failed ({code}): {stderr}")]
    Failed {
        op: &'static str,
        code: i32,
        stderr: String,
    },
}

/// What a diff, status or message covers: one path or the whole tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Path(String),
    All,
}

impl Scope {
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(path) => Some(path),
            Self::All => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.write_str(path),
            Self::All => f.write_str("all changes"),
        }
    }
}

/// Line totals from `git diff --numstat`. Binary entries count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub insertions: u64,
    pub deletions: u64,
}

impl DiffSummary {
    pub fn parse_numstat(output: &str) -> Self {
        let mut summary = Self::default();
        for line in output.lines() {
            let mut fields = line.split('\t');
            let added = fields.next().and_then(|v| v.trim().parse::<u64>().ok());
            let removed = fields.next().and_then(|v| v.trim().parse::<u64>().ok());
            summary.insertions += added.unwrap_or(0);
            summary.deletions += removed.unwrap_or(0);
        }
        summary
    }
}

/// Subject and relative age of the most recent commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCommit {
    pub subject: String,
    pub age: String,
}

#[async_trait]
pub trait Vcs: Send + Sync {
    /// `git status --porcelain` lines; empty means clean.
    async fn short_status(&self, scope: &Scope) -> Result<Vec<String>, VcsError>;
    async fn stage(&self, paths: &[String]) -> Result<(), VcsError>;
    async fn stage_all(&self) -> Result<(), VcsError>;
    /// Commits the index, restricted to `paths` when non-empty.
    async fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError>;
    async fn push(&self) -> Result<(), VcsError>;
    /// Working tree against `HEAD`.
    async fn diff_numstat(&self, scope: &Scope) -> Result<DiffSummary, VcsError>;
    async fn diff_text(&self, scope: &Scope, cached: bool) -> Result<String, VcsError>;
    async fn current_branch(&self) -> Result<Option<String>, VcsError>;
    async fn last_commit(&self) -> Result<Option<LastCommit>, VcsError>;
    /// Push URL of the configured remote.
    async fn remote_url(&self) -> Result<Option<String>, VcsError>;
}
