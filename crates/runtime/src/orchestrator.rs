//! Turning ready paths into commits.
//!
//! Every operation runs stage → message → commit → push in that order and
//! stops at the first failing step.  Failures are reported in the returned
//! [`CommitOutcome`] and logged; nothing here panics or retries.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use goblin_exec::{Scope, Vcs};
use tracing::{info, warn};

use crate::message::{MessageGenerator, timestamp};
use crate::version::VersionMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Stage,
    Message,
    Commit,
    Push,
    None,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stage => "stage",
            Self::Message => "message",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::None => "none",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The path committed, or `all changes` for a whole-tree commit.
    pub path: String,
    pub message: Option<String>,
    pub pushed: bool,
    pub succeeded: bool,
    pub failure_stage: FailureStage,
    /// Error text for a failed step.
    pub detail: Option<String>,
}

impl CommitOutcome {
    fn committed(path: &str, message: String, pushed: bool) -> Self {
        Self {
            path: path.to_string(),
            message: Some(message),
            pushed,
            succeeded: true,
            failure_stage: FailureStage::None,
            detail: None,
        }
    }

    fn failed(path: &str, message: Option<String>, stage: FailureStage, detail: String) -> Self {
        Self {
            path: path.to_string(),
            message,
            pushed: false,
            succeeded: false,
            failure_stage: stage,
            detail: Some(detail),
        }
    }

    fn noop(path: &str) -> Self {
        Self {
            path: path.to_string(),
            message: None,
            pushed: false,
            succeeded: true,
            failure_stage: FailureStage::None,
            detail: None,
        }
    }

    /// A successful commit-all that found a clean tree and did nothing.
    pub fn is_noop(&self) -> bool {
        self.succeeded && self.message.is_none()
    }

    /// True when a commit landed locally, even if the push then failed.
    pub fn committed_locally(&self) -> bool {
        self.succeeded || self.failure_stage == FailureStage::Push
    }
}

/// A message computed for review before anything is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub scope: Scope,
    pub message: String,
}

pub struct CommitOrchestrator {
    vcs: Arc<dyn Vcs>,
    messages: MessageGenerator,
    version: VersionMarker,
}

impl CommitOrchestrator {
    pub fn new(vcs: Arc<dyn Vcs>, messages: MessageGenerator, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            messages,
            version: VersionMarker::new(repo_root),
        }
    }

    pub async fn commit_path(&self, path: &str, push: bool) -> CommitOutcome {
        info!(path, "hoarding commit");
        if let Err(err) = self.vcs.stage(&[path.to_string()]).await {
            return report(CommitOutcome::failed(path, None, FailureStage::Stage, err.to_string()));
        }

        let message = self.messages.generate(&Scope::Path(path.to_string())).await;
        if message.trim().is_empty() {
            return report(CommitOutcome::failed(
                path,
                None,
                FailureStage::Message,
                "generated message is empty".to_string(),
            ));
        }
        self.commit_and_push(path, message, &[path.to_string()], push)
            .await
    }

    /// Commits everything in the working tree.
    ///
    /// A clean tree returns a no-op outcome without staging, committing or
    /// pushing.  A blank `custom_message` counts as absent.
    pub async fn commit_all(&self, custom_message: Option<&str>, push: bool) -> CommitOutcome {
        let label = Scope::All.to_string();
        let status = match self.vcs.short_status(&Scope::All).await {
            Ok(status) => status,
            Err(err) => {
                return report(CommitOutcome::failed(&label, None, FailureStage::Stage, err.to_string()));
            }
        };
        if status.is_empty() {
            info!("nothing to commit, working tree clean");
            return CommitOutcome::noop(&label);
        }

        if let Err(err) = self.vcs.stage_all().await {
            return report(CommitOutcome::failed(&label, None, FailureStage::Stage, err.to_string()));
        }

        let message = match custom_message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(custom) => custom.to_string(),
            None => {
                let generated = self.messages.generate(&Scope::All).await;
                if generated.trim().is_empty() {
                    stealth_label()
                } else {
                    generated
                }
            }
        };
        self.commit_and_push(&label, message, &[], push).await
    }

    // ── Ritual ──────────────────────────────────────────────────────────────

    /// Stages `path` and computes its message without committing.
    ///
    /// `None` when git reports nothing to commit for `path`, which is the
    /// case for the version marker right after [`confirm`](Self::confirm)
    /// committed it.
    pub async fn propose_path(&self, path: &str) -> Result<Option<Proposal>, CommitOutcome> {
        let scope = Scope::Path(path.to_string());
        let status = self
            .vcs
            .short_status(&scope)
            .await
            .map_err(|err| report(CommitOutcome::failed(path, None, FailureStage::Stage, err.to_string())))?;
        if status.is_empty() {
            return Ok(None);
        }
        if let Err(err) = self.vcs.stage(&[path.to_string()]).await {
            return Err(report(CommitOutcome::failed(path, None, FailureStage::Stage, err.to_string())));
        }
        let message = self.messages.generate(&scope).await;
        Ok(Some(Proposal { scope, message }))
    }

    /// Stages the whole tree and computes its message; `None` when clean.
    pub async fn propose_all(&self) -> Result<Option<Proposal>, CommitOutcome> {
        let label = Scope::All.to_string();
        let status = self
            .vcs
            .short_status(&Scope::All)
            .await
            .map_err(|err| report(CommitOutcome::failed(&label, None, FailureStage::Stage, err.to_string())))?;
        if status.is_empty() {
            return Ok(None);
        }
        if let Err(err) = self.vcs.stage_all().await {
            return Err(report(CommitOutcome::failed(&label, None, FailureStage::Stage, err.to_string())));
        }
        let message = self.messages.generate(&Scope::All).await;
        Ok(Some(Proposal {
            scope: Scope::All,
            message,
        }))
    }

    /// Accepts a proposal: bump the version marker, then commit and push.
    pub async fn confirm(&self, proposal: &Proposal, push: bool) -> CommitOutcome {
        let label = proposal.scope.to_string();
        let mut paths = proposal
            .scope
            .path()
            .map(|p| vec![p.to_string()])
            .unwrap_or_default();

        match self.version.bump() {
            Ok(Some(bump)) => {
                if let Err(err) = self.vcs.stage(&[bump.file.clone()]).await {
                    return report(CommitOutcome::failed(
                        &label,
                        Some(proposal.message.clone()),
                        FailureStage::Stage,
                        err.to_string(),
                    ));
                }
                if !paths.is_empty() && !paths.contains(&bump.file) {
                    paths.push(bump.file);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "could not rewrite version marker; committing without it"),
        }

        self.commit_and_push(&label, proposal.message.clone(), &paths, push)
            .await
    }

    async fn commit_and_push(&self, label: &str, message: String, paths: &[String], push: bool) -> CommitOutcome {
        info!(path = label, %message, "committing");
        if let Err(err) = self.vcs.commit(&message, paths).await {
            return report(CommitOutcome::failed(label, Some(message), FailureStage::Commit, err.to_string()));
        }
        if !push {
            return report(CommitOutcome::committed(label, message, false));
        }
        match self.vcs.push().await {
            Ok(()) => report(CommitOutcome::committed(label, message, true)),
            Err(err) => report(CommitOutcome::failed(label, Some(message), FailureStage::Push, err.to_string())),
        }
    }
}

/// Label used when no message could be produced for a whole-tree commit.
pub fn stealth_label() -> String {
    format!("Stealth commit at {}", timestamp())
}

fn report(outcome: CommitOutcome) -> CommitOutcome {
    if outcome.succeeded {
        info!(path = %outcome.path, pushed = outcome.pushed, "commit hoarded");
    } else {
        warn!(
            path = %outcome.path,
            stage = %outcome.failure_stage,
            detail = outcome.detail.as_deref().unwrap_or_default(),
            "goblin failed"
        );
    }
    outcome
}

// ── Tests ────────────────────────────────────────────────────────────────────
