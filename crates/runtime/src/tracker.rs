//! Debounced set of changed paths.
//!
//! The `notify` callback thread records events while the tick loop drains the
//! paths that have been quiet long enough.  Both sides go through one mutex.
//!
//! Drain order is oldest last event first, ties broken by path, so commits
//! land in the order the edits settled.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Patterns matched anywhere in the repository-relative path.
const IGNORED_FRAGMENTS: &[&str] = &[
    ".git/",
    "__pycache__",
    "node_modules",
    ".vscode",
    ".idea",
    ".DS_Store",
    ".env",
];

/// Patterns matched at the end of the repository-relative path.
const IGNORED_SUFFIXES: &[&str] = &[
    ".git", ".pyc", ".pyo", ".pyd", ".swp", ".swx", "~", ".tmp", ".log", ".pid", ".lock",
];

/// Case-sensitive substring and suffix filter for paths that are never committed.
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    fragments: Vec<String>,
    suffixes: Vec<String>,
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self {
            fragments: IGNORED_FRAGMENTS.iter().map(|p| (*p).to_string()).collect(),
            suffixes: IGNORED_SUFFIXES.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

impl IgnorePolicy {
    pub fn is_ignored(&self, relative: &str) -> bool {
        self.fragments.iter().any(|f| relative.contains(f.as_str()))
            || self.suffixes.iter().any(|s| relative.ends_with(s.as_str()))
    }
}

#[derive(Debug)]
pub struct ChangeTracker {
    repo_root: PathBuf,
    ignore: IgnorePolicy,
    pending: Mutex<BTreeMap<String, Instant>>,
}

impl ChangeTracker {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ignore: IgnorePolicy::default(),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn record_event(&self, path: &Path) -> bool {
        self.record_event_at(path, Instant::now())
    }

    /// Records a change seen at `at`.  Returns whether the path is now pending.
    pub fn record_event_at(&self, path: &Path, at: Instant) -> bool {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        };
        if absolute.is_dir() {
            return false;
        }

        let Some(relative) = self.relativize(&absolute) else {
            debug!(path = %path.display(), "event outside repository ignored");
            return false;
        };
        if self.ignore.is_ignored(&relative) {
            return false;
        }

        self.lock().insert(relative.clone(), at);
        info!(path = %relative, "change observed");
        true
    }

    /// Removes and returns every path quiet for at least `debounce`.
    pub fn drain_ready(&self, now: Instant, debounce: Duration) -> Vec<String> {
        let mut pending = self.lock();
        let mut ready = pending
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= debounce)
            .map(|(path, last)| (*last, path.clone()))
            .collect::<Vec<_>>();
        ready.sort();

        for (_, path) in &ready {
            pending.remove(path);
        }
        ready.into_iter().map(|(_, path)| path).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_pending(&self, relative: &str) -> bool {
        self.lock().contains_key(relative)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Instant>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `/`-separated path relative to the root, or `None` when outside it.
    fn relativize(&self, absolute: &Path) -> Option<String> {
        let relative = absolute.strip_prefix(&self.repo_root).ok()?;
        let parts = relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    const DEBOUNCE: Duration = Duration::from_secs(2);

    fn tracker() -> (TempDir, ChangeTracker) {
        let dir = TempDir::new().unwrap();
        let tracker = ChangeTracker::new(dir.path());
        (dir, tracker)
    }

    #[test]
    fn ignore_policy_matches_fragments_and_suffixes() {
        let policy = IgnorePolicy::default();
        for ignored in [
            ".git/index",
            "web/node_modules/react/index.js",
            "pkg/__pycache__/mod.cpython-311.pyc",
            ".vscode/settings.json",
            "notes.txt.swp",
            "draft.md~",
            "build/output.log",
            "daemon.pid",
            "Cargo.lock",
            ".env",
            "sub/.DS_Store",
            "scratch.tmp",
        ] {
            assert!(policy.is_ignored(ignored), "{ignored} should be ignored");
        }
        for kept in ["src/main.rs", "README.md", "docs/logging.md", "a.txt"] {
            assert!(!policy.is_ignored(kept), "{kept} should be kept");
        }
    }

    #[test]
    fn ignore_policy_is_case_sensitive() {
        let policy = IgnorePolicy::default();
        assert!(policy.is_ignored("server.log"));
        assert!(!policy.is_ignored("server.LOG"));
    }

    #[test]
    fn records_relative_path() {
        let (dir, tracker) = tracker();
        assert!(tracker.record_event(&dir.path().join("src").join("lib.rs")));
        assert!(tracker.is_pending("src/lib.rs"));
    }

    #[test]
    fn relative_input_is_resolved_against_root() {
        let (_dir, tracker) = tracker();
        assert!(tracker.record_event(Path::new("a.txt")));
        assert!(tracker.is_pending("a.txt"));
    }

    #[test]
    fn directories_are_ignored() {
        let (dir, tracker) = tracker();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        assert!(!tracker.record_event(&sub));
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn paths_outside_root_are_ignored() {
        let (_dir, tracker) = tracker();
        assert!(!tracker.record_event(Path::new("/somewhere/else/file.txt")));
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn ignored_paths_never_become_pending() {
        let (dir, tracker) = tracker();
        let lock = dir.path().join(".git").join("index.lock");
        for _ in 0..500 {
            assert!(!tracker.record_event(&lock));
        }
        assert_eq!(tracker.pending_len(), 0);
        assert!(tracker.drain_ready(Instant::now() + DEBOUNCE, Duration::ZERO).is_empty());
    }

    #[test]
    fn burst_becomes_ready_once_timed_from_last_event() {
        let (_dir, tracker) = tracker();
        let t0 = Instant::now();
        let last = t0 + Duration::from_millis(500);
        tracker.record_event_at(Path::new("b.txt"), t0);
        tracker.record_event_at(Path::new("b.txt"), last);
        assert_eq!(tracker.pending_len(), 1);

        // Two seconds after the first edit is not enough.
        assert!(tracker.drain_ready(t0 + DEBOUNCE, DEBOUNCE).is_empty());
        assert!(
            tracker
                .drain_ready(last + DEBOUNCE - Duration::from_millis(1), DEBOUNCE)
                .is_empty()
        );

        assert_eq!(tracker.drain_ready(last + DEBOUNCE, DEBOUNCE), vec!["b.txt"]);
        // Readiness is a transition: the same burst never fires twice.
        assert!(tracker.drain_ready(last + DEBOUNCE * 5, DEBOUNCE).is_empty());
    }

    #[test]
    fn drain_order_is_oldest_first_then_path() {
        let (_dir, tracker) = tracker();
        let t0 = Instant::now();
        tracker.record_event_at(Path::new("z.txt"), t0);
        tracker.record_event_at(Path::new("m.txt"), t0 + Duration::from_millis(10));
        tracker.record_event_at(Path::new("b.txt"), t0 + Duration::from_millis(10));
        tracker.record_event_at(Path::new("a.txt"), t0 + Duration::from_millis(20));

        let ready = tracker.drain_ready(t0 + Duration::from_secs(10), DEBOUNCE);
        assert_eq!(ready, vec!["z.txt", "b.txt", "m.txt", "a.txt"]);
    }

    #[test]
    fn only_quiet_paths_are_drained() {
        let (_dir, tracker) = tracker();
        let t0 = Instant::now();
        tracker.record_event_at(Path::new("old.txt"), t0);
        tracker.record_event_at(Path::new("new.txt"), t0 + Duration::from_secs(3));

        let ready = tracker.drain_ready(t0 + Duration::from_secs(4), DEBOUNCE);
        assert_eq!(ready, vec!["old.txt"]);
        assert!(tracker.is_pending("new.txt"));
    }

    #[test]
    fn zero_debounce_drains_immediately() {
        let (_dir, tracker) = tracker();
        tracker.record_event(Path::new("a.txt"));
        assert_eq!(tracker.drain_ready(Instant::now(), Duration::ZERO), vec!["a.txt"]);
    }

    #[test]
    fn concurrent_record_and_drain_loses_nothing() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(ChangeTracker::new(dir.path()));

        let writer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0..200 {
                    tracker.record_event(Path::new(&format!("f{i}.txt")));
                }
            })
        };

        let mut drained = Vec::new();
        while !writer.is_finished() {
            drained.extend(tracker.drain_ready(Instant::now(), Duration::ZERO));
        }
        writer.join().unwrap();
        drained.extend(tracker.drain_ready(Instant::now(), Duration::ZERO));

        drained.sort();
        drained.dedup();
        assert_eq!(drained.len(), 200);
        assert_eq!(tracker.pending_len(), 0);
    }
}
