//! The goblin engine: debounced change tracking, commit orchestration, the
//! watch loop and the detached-process lifecycle.

pub mod daemon;
mod error;
pub mod message;
pub mod orchestrator;
pub mod status;
pub mod tracker;
pub mod version;
pub mod watch;

#[cfg(test)]
mod testing;

pub use daemon::{DAEMON_ENV, DaemonLauncher, DaemonLifecycle, InstanceGuard, StopOutcome, is_daemon_process};
pub use error::GoblinError;
pub use message::{GenerationError, MessageGenerator, MessageStrategy};
pub use orchestrator::{CommitOrchestrator, CommitOutcome, FailureStage, Proposal};
pub use status::StatusReport;
pub use tracker::{ChangeTracker, IgnorePolicy};
pub use version::{VersionBump, VersionMarker};
pub use watch::{RitualPrompt, RunMode, TickReport, WatchLoop, WatchSession, shutdown_on_signals, signal_shutdown};
