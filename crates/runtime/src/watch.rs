//! The watch loop: filesystem events in, commits out.
//!
//! A `notify` watcher feeds [`ChangeTracker`] from its own thread.  Once a
//! second the loop drains the paths that have gone quiet and hands them, one
//! at a time, to the [`CommitOrchestrator`] according to the session's
//! [`RunMode`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::GoblinError;
use crate::orchestrator::{CommitOrchestrator, CommitOutcome, Proposal};
use crate::tracker::ChangeTracker;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Normal,
    Ritual,
    Hoard,
}

/// Flags for one watching session, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSession {
    debounce: Duration,
    ritual: bool,
    hoard: bool,
    detached: bool,
}

impl WatchSession {
    pub fn new(debounce: Duration, ritual: bool, hoard: bool, detached: bool) -> Result<Self, GoblinError> {
        if ritual && detached {
            return Err(GoblinError::RitualDetached);
        }
        Ok(Self {
            debounce,
            ritual,
            hoard,
            detached,
        })
    }

    pub fn mode(&self) -> RunMode {
        if self.ritual {
            RunMode::Ritual
        } else if self.hoard {
            RunMode::Hoard
        } else {
            RunMode::Normal
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Commits are pushed unless hoarding, in every mode.
    pub fn pushes(&self) -> bool {
        !self.hoard
    }
}

/// Asks whether a proposed ritual commit should go ahead.
#[async_trait]
pub trait RitualPrompt: Send + Sync {
    async fn confirm(&self, proposal: &Proposal) -> bool;
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub outcomes: Vec<CommitOutcome>,
    /// Ritual proposals the user declined.
    pub rejected: Vec<String>,
    /// Shutdown arrived while waiting for a ritual decision.
    pub interrupted: bool,
}

pub struct WatchLoop {
    session: WatchSession,
    tracker: Arc<ChangeTracker>,
    orchestrator: CommitOrchestrator,
    prompt: Option<Arc<dyn RitualPrompt>>,
}

impl WatchLoop {
    pub fn new(
        repo_root: impl AsRef<Path>,
        session: WatchSession,
        orchestrator: CommitOrchestrator,
        prompt: Option<Arc<dyn RitualPrompt>>,
    ) -> Result<Self, GoblinError> {
        let repo_root = repo_root.as_ref();
        if !repo_root.join(".git").exists() {
            return Err(GoblinError::NotARepository(repo_root.to_path_buf()));
        }
        if session.mode() == RunMode::Ritual && prompt.is_none() {
            return Err(GoblinError::MissingPrompt);
        }
        // notify reports canonical paths; the tracker must relativize against the same root.
        let root = repo_root.canonicalize()?;
        Ok(Self {
            session,
            tracker: Arc::new(ChangeTracker::new(root)),
            orchestrator,
            prompt,
        })
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    /// Processes every path ready at `now`.
    pub async fn tick(&self, now: Instant) -> TickReport {
        self.tick_with(now, None).await
    }

    async fn tick_with(&self, now: Instant, mut shutdown: Option<&mut watch::Receiver<bool>>) -> TickReport {
        let mut report = TickReport::default();
        for path in self.tracker.drain_ready(now, self.session.debounce) {
            match self.session.mode() {
                RunMode::Normal => report.outcomes.push(self.orchestrator.commit_path(&path, true).await),
                RunMode::Hoard => report.outcomes.push(self.orchestrator.commit_path(&path, false).await),
                RunMode::Ritual => {
                    let proposal = match self.orchestrator.propose_path(&path).await {
                        Ok(Some(proposal)) => proposal,
                        Ok(None) => {
                            debug!(path = %path, "nothing to commit; no ritual");
                            continue;
                        }
                        Err(outcome) => {
                            report.outcomes.push(outcome);
                            continue;
                        }
                    };
                    let Some(accepted) = self.decide(&proposal, shutdown.as_deref_mut()).await else {
                        info!(path = %path, "shutdown during ritual; proposal abandoned");
                        report.interrupted = true;
                        return report;
                    };
                    if accepted {
                        report
                            .outcomes
                            .push(self.orchestrator.confirm(&proposal, self.session.pushes()).await);
                    } else {
                        info!(path = %path, "ritual rejected; changes left staged");
                        report.rejected.push(path);
                    }
                }
            }
        }
        report
    }

    /// `None` when shutdown wins the race against the prompt.
    async fn decide(&self, proposal: &Proposal, shutdown: Option<&mut watch::Receiver<bool>>) -> Option<bool> {
        let prompt = self.prompt.as_ref()?;
        match shutdown {
            Some(rx) => tokio::select! {
                accepted = prompt.confirm(proposal) => Some(accepted),
                _ = wait_for_shutdown(rx) => None,
            },
            None => Some(prompt.confirm(proposal).await),
        }
    }

    /// Watches until `shutdown` turns true.  Pending changes are dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), GoblinError> {
        let root = self.tracker.repo_root().to_path_buf();
        let tracker = Arc::clone(&self.tracker);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in &event.paths {
                        tracker.record_event(path);
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "file watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!(
            root = %root.display(),
            mode = ?self.session.mode(),
            detached = self.session.detached,
            debounce_secs = self.session.debounce.as_secs_f64(),
            "goblin summoned"
        );

        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
            let report = self.tick_with(Instant::now(), Some(&mut shutdown)).await;
            if report.interrupted {
                break;
            }
        }

        drop(watcher);
        info!(pending = self.tracker.pending_len(), "goblin stopped watching");
        Ok(())
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Resolves once the flag is true or its sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C off unix).
pub async fn shutdown_on_signals() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Shutdown channel flipped by [`shutdown_on_signals`].
pub fn signal_shutdown() -> watch::Receiver<bool> {
    shutdown_channel(shutdown_on_signals())
}

/// Flips the channel when `signal` resolves.  If the handlers cannot be
/// installed the sender is kept alive forever, so the loop keeps watching
/// instead of reading a dropped sender as shutdown.
fn shutdown_channel<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = signal.await {
            warn!(error = %err, "could not install signal handlers; stop the goblin with SIGKILL");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

// ── Tests ────────────────────────────────────────────────────────────────────
