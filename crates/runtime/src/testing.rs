//! In-memory collaborators shared by the unit tests.

use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use goblin_exec::{DiffSummary, LastCommit, Scope, Vcs, VcsError};
use goblin_llm::{ChatCompletion, CompletionError};

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    /// Every call, rendered as a short string (`"add a.txt"`, `"push"`, ...).
    pub calls: Vec<String>,
    pub status: Vec<String>,
    pub numstat: DiffSummary,
    pub staged_diff: String,
    pub unstaged_diff: String,
    /// Operation names (`status`, `add`, `commit`, `push`, `diff`) that fail.
    pub failing: HashSet<&'static str>,
    pub commits: Vec<(String, Vec<String>)>,
    pub pushes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct FakeVcs {
    state: Mutex<FakeState>,
}

impl FakeVcs {
    pub fn with(setup: impl FnOnce(&mut FakeState)) -> Arc<Self> {
        let mut state = FakeState::default();
        setup(&mut state);
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn call(&self, op: &'static str, rendered: String) -> Result<(), VcsError> {
        let mut state = self.state();
        state.calls.push(rendered);
        if state.failing.contains(op) {
            return Err(VcsError::Failed {
                op,
                code: 1,
                stderr: format!("{op} exploded"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn short_status(&self, scope: &Scope) -> Result<Vec<String>, VcsError> {
        self.call("status", "status".to_string())?;
        Ok(self
            .state()
            .status
            .iter()
            .filter(|line| scope.path().is_none_or(|path| porcelain_path(line) == path))
            .cloned()
            .collect())
    }

    async fn stage(&self, paths: &[String]) -> Result<(), VcsError> {
        self.call("add", format!("add {}", paths.join(" ")))
    }

    async fn stage_all(&self) -> Result<(), VcsError> {
        self.call("add", "add -A".to_string())
    }

    async fn commit(&self, message: &str, paths: &[String]) -> Result<(), VcsError> {
        self.call("commit", format!("commit {message}"))?;
        let mut state = self.state();
        // Committed entries leave the working-tree status, as with real git.
        if paths.is_empty() {
            state.status.clear();
        } else {
            state
                .status
                .retain(|line| !paths.iter().any(|path| porcelain_path(line) == path));
        }
        state.commits.push((message.to_string(), paths.to_vec()));
        Ok(())
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.call("push", "push".to_string())?;
        self.state().pushes += 1;
        Ok(())
    }

    async fn diff_numstat(&self, _scope: &Scope) -> Result<DiffSummary, VcsError> {
        self.call("diff", "diff --numstat".to_string())?;
        Ok(self.state().numstat)
    }

    async fn diff_text(&self, _scope: &Scope, cached: bool) -> Result<String, VcsError> {
        self.call("diff", format!("diff cached={cached}"))?;
        let state = self.state();
        Ok(if cached {
            state.staged_diff.clone()
        } else {
            state.unstaged_diff.clone()
        })
    }

    async fn current_branch(&self) -> Result<Option<String>, VcsError> {
        self.call("branch", "branch".to_string())?;
        Ok(Some("main".to_string()))
    }

    async fn last_commit(&self) -> Result<Option<LastCommit>, VcsError> {
        self.call("log", "log".to_string())?;
        Ok(self.state().commits.last().map(|(subject, _)| LastCommit {
            subject: subject.clone(),
            age: "2 seconds ago".to_string(),
        }))
    }

    async fn remote_url(&self) -> Result<Option<String>, VcsError> {
        self.call("remote", "remote".to_string())?;
        Ok(Some("git@example.com:goblin/hoard.git".to_string()))
    }
}

/// Path part of a `git status --porcelain` line (`XY path`).
fn porcelain_path(line: &str) -> &str {
    line.get(3..).unwrap_or_default()
}

/// Chat client returning a canned reply, or failing when `reply` is `None`.
#[derive(Debug, Default)]
pub(crate) struct FakeCompletion {
    pub reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::default(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ChatCompletion for FakeCompletion {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or(CompletionError::MalformedEnvelope)
    }
}

// ── Real git ─────────────────────────────────────────────────────────────────

pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub(crate) fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Repository with identity configured and one initial commit of `a.txt`.
pub(crate) fn init_git_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("a.txt"), "one\n").unwrap();
    git(dir, &["add", "a.txt"]);
    git(dir, &["commit", "-q", "-m", "Initial commit"]);
}

pub(crate) fn commit_count(dir: &Path) -> usize {
    git(dir, &["rev-list", "--count", "HEAD"]).trim().parse().unwrap()
}
