//! Detached goblin lifecycle.
//!
//! The parent spawns a copy of the binary with [`DAEMON_ENV`] set, waits a
//! short window to see it survive, then records its pid in
//! `.git/gitgoblin.pid`.  The child holds an exclusive lock on
//! `.git/gitgoblin.lock` for as long as it watches.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use fs2::FileExt;
use goblin_config::GoblinPaths;
use tracing::{debug, info, warn};

use crate::error::GoblinError;

/// Set in the environment of the detached child.
pub const DAEMON_ENV: &str = "GITGOBLIN_DAEMON_PROCESS";

const STARTUP_WINDOW: Duration = Duration::from_millis(500);
const STOP_GRACE: Duration = Duration::from_secs(2);
const POLL_STEP: Duration = Duration::from_millis(50);

/// True inside the detached child.
pub fn is_daemon_process() -> bool {
    std::env::var(DAEMON_ENV).is_ok_and(|v| v == "1")
}

/// What to execute for the detached child.
#[derive(Debug, Clone)]
pub struct DaemonLauncher {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl DaemonLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-runs the current binary with `args`.
    pub fn current_exe(args: Vec<String>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NothingToStop,
    Stopped(u32),
    StaleRecordCleared(u32),
}

#[derive(Debug, Clone)]
pub struct DaemonLifecycle {
    paths: GoblinPaths,
    startup_window: Duration,
    stop_grace: Duration,
}

impl DaemonLifecycle {
    pub fn new(paths: GoblinPaths) -> Self {
        Self {
            paths,
            startup_window: STARTUP_WINDOW,
            stop_grace: STOP_GRACE,
        }
    }

    pub fn paths(&self) -> &GoblinPaths {
        &self.paths
    }

    /// Pid in the record, `None` when missing or unparseable.
    pub fn read_record(&self) -> Option<u32> {
        let raw = fs::read_to_string(&self.paths.pid_file).ok()?;
        raw.trim().parse::<u32>().ok()
    }

    pub fn is_active(&self) -> bool {
        self.read_record().is_some_and(is_pid_running)
    }

    /// Spawns the detached child and returns its pid once it has survived
    /// the startup window.
    pub fn start(&self, launch: &DaemonLauncher) -> Result<u32, GoblinError> {
        if let Some(pid) = self.read_record() {
            if is_pid_running(pid) {
                return Err(GoblinError::AlreadyRunning { pid });
            }
            info!(pid, "removing stale daemon record");
            self.clear_record();
        }

        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log_file)?;
        let err = out.try_clone()?;

        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .current_dir(&self.paths.repo_root)
            .env(DAEMON_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn()?;
        let pid = child.id();

        let mut waited = Duration::ZERO;
        while waited < self.startup_window {
            if let Some(status) = child.try_wait()? {
                return Err(GoblinError::DaemonStartup(format!(
                    "exited with {status}; check {}",
                    self.paths.log_file.display()
                )));
            }
            std::thread::sleep(POLL_STEP);
            waited += POLL_STEP;
        }

        fs::write(&self.paths.pid_file, pid.to_string())?;
        // Reap the child if it exits while this process is still around.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        info!(pid, log = %self.paths.log_file.display(), "goblin detached");
        Ok(pid)
    }

    pub fn stop(&self) -> io::Result<StopOutcome> {
        let Some(pid) = self.read_record() else {
            if self.paths.pid_file.exists() {
                warn!("unreadable daemon record removed");
                self.clear_record();
            }
            return Ok(StopOutcome::NothingToStop);
        };

        if !is_pid_running(pid) {
            self.clear_record();
            return Ok(StopOutcome::StaleRecordCleared(pid));
        }

        if !terminate_pid(pid)? && is_pid_running(pid) {
            return Err(io::Error::other(format!("failed to terminate goblin pid {pid}")));
        }
        if !wait_for_pid_exit(pid, self.stop_grace) {
            warn!(pid, "goblin still running after grace period");
        }
        self.clear_record();
        info!(pid, "goblin banished");
        Ok(StopOutcome::Stopped(pid))
    }

    /// Taken by the detached child: locks the instance and (re)writes the
    /// record with its own pid.  Dropping the guard removes the record.
    pub fn hold_instance_lock(&self) -> Result<InstanceGuard, GoblinError> {
        let lock = File::create(&self.paths.lock_file)?;
        if lock.try_lock_exclusive().is_err() {
            let pid = self.read_record().unwrap_or_default();
            return Err(GoblinError::AlreadyRunning { pid });
        }
        let pid = std::process::id();
        fs::write(&self.paths.pid_file, pid.to_string())?;
        debug!(pid, "instance lock held");
        Ok(InstanceGuard {
            _lock: lock,
            pid,
            pid_file: self.paths.pid_file.clone(),
        })
    }

    fn clear_record(&self) {
        let _ = fs::remove_file(&self.paths.pid_file);
    }
}

#[derive(Debug)]
pub struct InstanceGuard {
    _lock: File,
    pid: u32,
    pid_file: PathBuf,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let ours = fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            == Some(self.pid);
        if ours {
            let _ = fs::remove_file(&self.pid_file);
        }
    }
}

// ── Process helpers ───────────────────────────────────────────────────────────

pub fn is_pid_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Sends SIGTERM.  `Ok(false)` when the signal could not be delivered.
fn terminate_pid(pid: u32) -> io::Result<bool> {
    #[cfg(unix)]
    {
        let status = Command::new("kill")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()?;
        Ok(status.success())
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(io::Error::other("banish is only implemented on unix"))
    }
}

/// Returns whether the process exited within `timeout`.
fn wait_for_pid_exit(pid: u32, timeout: Duration) -> bool {
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if !is_pid_running(pid) {
            return true;
        }
        std::thread::sleep(POLL_STEP);
        waited += POLL_STEP;
    }
    !is_pid_running(pid)
}

// ── Tests ────────────────────────────────────────────────────────────────────
