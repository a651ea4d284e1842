use std::path::Path;

use anyhow::Result;
use tracing::info;

use goblin_config::GoblinPaths;
use goblin_runtime::{DaemonLauncher, DaemonLifecycle, StopOutcome, WatchLoop, signal_shutdown};

use crate::SummonArgs;

/// Arguments the detached child is re-run with.  Mode flags travel along;
/// the child recognises itself by its environment.
pub(crate) fn child_args(root: &Path, args: &SummonArgs) -> Vec<String> {
    let mut child = vec![
        "summon".to_string(),
        "--path".to_string(),
        root.display().to_string(),
        "--debounce".to_string(),
        args.debounce.to_string(),
    ];
    if args.hoard {
        child.push("--hoard".to_string());
    }
    child
}

pub(crate) fn detach(paths: &GoblinPaths, args: &SummonArgs) -> Result<()> {
    let launcher = DaemonLauncher::current_exe(child_args(&paths.repo_root, args))?;
    let lifecycle = DaemonLifecycle::new(paths.clone());
    let pid = lifecycle.start(&launcher)?;

    println!("goblin summoned in the background");
    println!("- pid: {pid}");
    println!("- log: {}", paths.log_file.display());
    println!("run `gitgoblin banish` to stop it");
    Ok(())
}

/// Body of the detached child.
pub(crate) async fn run_detached(paths: &GoblinPaths, watch_loop: WatchLoop) -> Result<()> {
    let lifecycle = DaemonLifecycle::new(paths.clone());
    let _guard = lifecycle.hold_instance_lock()?;
    info!(pid = std::process::id(), "detached goblin watching");

    watch_loop.run(signal_shutdown()).await?;
    info!("detached goblin exiting");
    Ok(())
}

pub(crate) fn banish(root: &Path) -> Result<()> {
    let lifecycle = DaemonLifecycle::new(GoblinPaths::for_repo(root));
    match lifecycle.stop()? {
        StopOutcome::NothingToStop => println!("no goblin is running here"),
        StopOutcome::StaleRecordCleared(pid) => {
            println!("goblin was not running (stale pid {pid} cleaned)")
        }
        StopOutcome::Stopped(pid) => println!("goblin banished (pid {pid})"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn summon_args(hoard: bool) -> SummonArgs {
        SummonArgs {
            path: PathBuf::from("."),
            debounce: 1.5,
            daemon: true,
            ritual: false,
            hoard,
        }
    }

    #[test]
    fn child_args_carry_mode_but_not_daemon_flag() {
        let args = child_args(Path::new("/repo"), &summon_args(true));
        assert_eq!(
            args,
            vec!["summon", "--path", "/repo", "--debounce", "1.5", "--hoard"]
        );
        assert!(!args.iter().any(|a| a == "--daemon"));
    }

    #[test]
    fn child_args_without_hoard() {
        let args = child_args(Path::new("/repo"), &summon_args(false));
        assert_eq!(args, vec!["summon", "--path", "/repo", "--debounce", "1.5"]);
    }

    #[test]
    fn banish_without_goblin_is_fine() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        banish(dir.path()).unwrap();
    }
}
