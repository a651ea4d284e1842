use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a whole operation rather than one path's commit.
#[derive(Debug, Error)]
pub enum GoblinError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("ritual mode needs an interactive terminal and cannot run as a daemon")]
    RitualDetached,

    #[error("ritual mode needs a prompt to ask for confirmation")]
    MissingPrompt,

    #[error("a goblin is already watching this repository (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("daemon failed to start: {0}")]
    DaemonStartup(String),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GoblinError {
    /// Problems with how the goblin was invoked, reported before any watching.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotARepository(_) | Self::RitualDetached | Self::MissingPrompt
        )
    }
}
