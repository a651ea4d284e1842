//! Snapshot of one repository's goblin state.

use goblin_exec::{LastCommit, Scope, Vcs};
use tracing::debug;

use crate::daemon::DaemonLifecycle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub daemon_pid: Option<u32>,
    pub branch: String,
    pub remote: Option<String>,
    pub last_commit: Option<LastCommit>,
    pub uncommitted: usize,
}

impl StatusReport {
    /// Every field degrades instead of failing: `unknown` branch, no remote,
    /// no last commit, zero uncommitted entries.
    pub async fn collect(vcs: &dyn Vcs, lifecycle: &DaemonLifecycle) -> Self {
        let daemon_pid = lifecycle.read_record().filter(|_| lifecycle.is_active());

        let branch = match vcs.current_branch().await {
            Ok(Some(branch)) => branch,
            Ok(None) => "unknown".to_string(),
            Err(err) => {
                debug!(error = %err, "branch unavailable");
                "unknown".to_string()
            }
        };
        let remote = vcs.remote_url().await.ok().flatten();
        let last_commit = vcs.last_commit().await.ok().flatten();
        let uncommitted = vcs
            .short_status(&Scope::All)
            .await
            .map(|lines| lines.len())
            .unwrap_or(0);

        Self {
            daemon_pid,
            branch,
            remote,
            last_commit,
            uncommitted,
        }
    }

    pub fn is_active(&self) -> bool {
        self.daemon_pid.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVcs;
    use goblin_config::GoblinPaths;
    use std::fs;
    use tempfile::TempDir;

    fn lifecycle(dir: &TempDir) -> DaemonLifecycle {
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        DaemonLifecycle::new(GoblinPaths::for_repo(dir.path()))
    }

    #[tokio::test]
    async fn collects_everything_from_vcs() {
        let dir = TempDir::new().unwrap();
        let vcs = FakeVcs::with(|s| {
            s.status = vec![" M a.txt".to_string(), "?? b.txt".to_string()];
            s.commits.push(("Modified a.txt".to_string(), Vec::new()));
        });

        let report = StatusReport::collect(&*vcs, &lifecycle(&dir)).await;
        assert!(!report.is_active());
        assert_eq!(report.branch, "main");
        assert_eq!(report.remote.as_deref(), Some("git@example.com:goblin/hoard.git"));
        assert_eq!(report.last_commit.unwrap().subject, "Modified a.txt");
        assert_eq!(report.uncommitted, 2);
    }

    #[tokio::test]
    async fn failures_degrade_to_defaults() {
        let dir = TempDir::new().unwrap();
        let vcs = FakeVcs::with(|s| {
            s.status = vec![" M a.txt".to_string()];
            for op in ["branch", "remote", "log", "status"] {
                s.failing.insert(op);
            }
        });

        let report = StatusReport::collect(&*vcs, &lifecycle(&dir)).await;
        assert_eq!(report.branch, "unknown");
        assert_eq!(report.remote, None);
        assert_eq!(report.last_commit, None);
        assert_eq!(report.uncommitted, 0);
    }

    #[tokio::test]
    async fn live_record_reports_active() {
        let dir = TempDir::new().unwrap();
        let lifecycle = lifecycle(&dir);
        fs::write(&lifecycle.paths().pid_file, std::process::id().to_string()).unwrap();

        let vcs = FakeVcs::with(|_| {});
        let report = StatusReport::collect(&*vcs, &lifecycle).await;
        if cfg!(unix) {
            assert_eq!(report.daemon_pid, Some(std::process::id()));
        }
    }
}
