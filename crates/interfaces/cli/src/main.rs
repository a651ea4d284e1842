mod daemon;
mod interactive;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use goblin_config::{GoblinConfig, GoblinPaths};
use goblin_exec::{GitCli, Vcs};
use goblin_runtime::{
    CommitOrchestrator, DaemonLifecycle, GoblinError, MessageGenerator, RitualPrompt, StatusReport, WatchLoop,
    WatchSession, is_daemon_process, signal_shutdown,
};

use crate::interactive::TerminalPrompt;

#[derive(Debug, Parser)]
#[command(
    name = "gitgoblin",
    version,
    about = "A goblin that watches your repository and commits for you"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start watching and auto-committing.
    Summon(SummonArgs),
    /// Commit everything right now.
    Sneak {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Commit message; generated when omitted.
        #[arg(short, long)]
        message: Option<String>,
        /// Commit without pushing.
        #[arg(long)]
        hoard: bool,
    },
    /// Show what the goblin is up to.
    Crystalball {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
    /// Stop a background goblin.
    Banish {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
    /// Configure AI commit messages.
    Enchant {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub(crate) struct SummonArgs {
    #[arg(short, long, default_value = ".")]
    pub(crate) path: PathBuf,
    /// Seconds a file must stay quiet before it is committed.
    #[arg(short, long, default_value = "2", value_parser = parse_debounce)]
    pub(crate) debounce: f64,
    /// Run detached in the background.
    #[arg(long)]
    pub(crate) daemon: bool,
    /// Ask before each commit and bump the project version.
    #[arg(long)]
    pub(crate) ritual: bool,
    /// Commit locally without pushing.
    #[arg(long)]
    pub(crate) hoard: bool,
}

fn parse_debounce(raw: &str) -> Result<f64, String> {
    let secs = raw
        .parse::<f64>()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err("debounce must be zero or more seconds".to_string());
    }
    Ok(secs)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    run_to_completion(runtime, dispatch(cli.command))
}

/// Drives `task` to completion, then drops the runtime without waiting on
/// blocking work.  A ritual prompt parked in a stdin read would otherwise
/// keep the process alive after Ctrl-C.
fn run_to_completion<F: Future>(runtime: tokio::runtime::Runtime, task: F) -> F::Output {
    let output = runtime.block_on(task);
    runtime.shutdown_background();
    output
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Summon(args) => summon(args).await?,
        Commands::Sneak { path, message, hoard } => sneak(&path, message.as_deref(), hoard).await?,
        Commands::Crystalball { path } => crystalball(&path).await?,
        Commands::Banish { path } => daemon::banish(&resolve_repo(&path)?)?,
        Commands::Enchant {
            path,
            api_key,
            enable,
            disable,
        } => {
            let toggle = if enable {
                Some(true)
            } else if disable {
                Some(false)
            } else {
                None
            };
            enchant(&path, api_key, toggle)?;
        }
    }

    Ok(())
}

/// Absolute repository root; refuses directories without `.git`.
pub(crate) fn resolve_repo(path: &Path) -> Result<PathBuf> {
    let root = path.canonicalize().map_err(|_| GoblinError::NotARepository(path.to_path_buf()))?;
    if !GoblinPaths::for_repo(&root).is_repository() {
        return Err(GoblinError::NotARepository(root).into());
    }
    Ok(root)
}

fn orchestrator_for(root: &Path, paths: &GoblinPaths) -> Result<CommitOrchestrator> {
    let config = GoblinConfig::load_from(&paths.config_file)?;
    let vcs: Arc<dyn Vcs> = Arc::new(GitCli::new(root));
    let messages = MessageGenerator::from_config(Arc::clone(&vcs), &config);
    Ok(CommitOrchestrator::new(vcs, messages, root))
}

async fn summon(args: SummonArgs) -> Result<()> {
    let root = resolve_repo(&args.path)?;
    let detached_child = is_daemon_process();
    let session = WatchSession::new(
        Duration::from_secs_f64(args.debounce),
        args.ritual,
        args.hoard,
        args.daemon || detached_child,
    )?;
    let paths = GoblinPaths::for_repo(&root);

    if args.daemon && !detached_child {
        return daemon::detach(&paths, &args);
    }

    let prompt: Option<Arc<dyn RitualPrompt>> = if args.ritual {
        Some(Arc::new(TerminalPrompt))
    } else {
        None
    };
    let watch_loop = WatchLoop::new(&root, session, orchestrator_for(&root, &paths)?, prompt)?;

    if detached_child {
        return daemon::run_detached(&paths, watch_loop).await;
    }

    println!("goblin summoned");
    println!("- repository: {}", root.display());
    println!("- mode: {:?}", session.mode());
    println!("- debounce: {}s", args.debounce);
    println!("press Ctrl-C to banish");
    watch_loop.run(signal_shutdown()).await?;
    println!("goblin vanished");
    Ok(())
}

async fn sneak(path: &Path, message: Option<&str>, hoard: bool) -> Result<()> {
    let root = resolve_repo(path)?;
    let paths = GoblinPaths::for_repo(&root);
    let outcome = orchestrator_for(&root, &paths)?.commit_all(message, !hoard).await;

    if outcome.is_noop() {
        println!("nothing to commit, working tree clean");
        return Ok(());
    }
    if !outcome.succeeded {
        bail!(
            "sneak failed at {} stage: {}",
            outcome.failure_stage,
            outcome.detail.as_deref().unwrap_or("unknown error")
        );
    }

    println!("sneaky commit hoarded");
    if let Some(message) = &outcome.message {
        println!("- message: {message}");
    }
    println!("- pushed: {}", if outcome.pushed { "yes" } else { "no (hoarded)" });
    Ok(())
}

async fn crystalball(path: &Path) -> Result<()> {
    let root = resolve_repo(path)?;
    let lifecycle = DaemonLifecycle::new(GoblinPaths::for_repo(&root));
    let vcs = GitCli::new(&root);
    let report = StatusReport::collect(&vcs, &lifecycle).await;

    match report.daemon_pid {
        Some(pid) => {
            println!("goblin status: active");
            println!("- pid: {pid}");
        }
        None => println!("goblin status: dormant"),
    }
    println!("- branch: {}", report.branch);
    println!("- remote: {}", report.remote.as_deref().unwrap_or("(none)"));
    match &report.last_commit {
        Some(commit) => println!("- last commit: {} ({})", commit.subject, commit.age),
        None => println!("- last commit: (none)"),
    }
    println!("- uncommitted changes: {}", report.uncommitted);
    Ok(())
}

fn enchant(path: &Path, api_key: Option<String>, toggle: Option<bool>) -> Result<()> {
    let root = resolve_repo(path)?;
    let paths = GoblinPaths::for_repo(&root);
    let mut config = GoblinConfig::load_from(&paths.config_file)?;

    let changed = api_key.is_some() || toggle.is_some();
    if let Some(key) = api_key {
        if key.trim().is_empty() {
            bail!("api key must not be empty");
        }
        config.set_api_key(key.trim());
    }
    if let Some(enabled) = toggle {
        if enabled && config.api_key().is_none() {
            bail!("no API key configured; pass --api-key or set GROQ_API_KEY");
        }
        config.enable_ai_commits(enabled);
    }
    if changed {
        config.save_to(&paths.config_file)?;
        println!("enchantment saved to {}", paths.config_file.display());
    }

    let state = match (config.is_ai_enabled(), config.ai_ready()) {
        (true, true) => "enabled",
        (true, false) => "enabled (no API key, using heuristic messages)",
        (false, _) => "disabled",
    };
    println!("AI commit messages: {state}");
    println!(
        "- api key: {}",
        if config.api_key().is_some() { "configured" } else { "missing" }
    );
    println!("- model: {}", config.ai_model);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn summon_defaults() {
        let cli = Cli::try_parse_from(["gitgoblin", "summon"]).unwrap();
        let Commands::Summon(args) = cli.command else {
            panic!("expected summon");
        };
        assert_eq!(args.path, PathBuf::from("."));
        assert_eq!(args.debounce, 2.0);
        assert!(!args.daemon && !args.ritual && !args.hoard);
    }

    #[test]
    fn summon_flags() {
        let cli =
            Cli::try_parse_from(["gitgoblin", "summon", "-p", "/tmp/repo", "-d", "0.5", "--hoard", "--daemon"]).unwrap();
        let Commands::Summon(args) = cli.command else {
            panic!("expected summon");
        };
        assert_eq!(args.path, PathBuf::from("/tmp/repo"));
        assert_eq!(args.debounce, 0.5);
        assert!(args.hoard && args.daemon);
    }

    #[test]
    fn negative_debounce_is_rejected() {
        assert!(Cli::try_parse_from(["gitgoblin", "summon", "-d", "-1"]).is_err());
        assert!(parse_debounce("abc").is_err());
        assert_eq!(parse_debounce("0").unwrap(), 0.0);
    }

    #[test]
    fn enchant_toggles_conflict() {
        assert!(Cli::try_parse_from(["gitgoblin", "enchant", "--enable", "--disable"]).is_err());
    }

    #[test]
    fn sneak_message() {
        let cli = Cli::try_parse_from(["gitgoblin", "sneak", "-m", "wip", "--hoard"]).unwrap();
        match cli.command {
            Commands::Sneak { message, hoard, .. } => {
                assert_eq!(message.as_deref(), Some("wip"));
                assert!(hoard);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn resolve_repo_requires_git_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(resolve_repo(dir.path()).is_err());
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert_eq!(resolve_repo(dir.path()).unwrap(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn enchant_persists_key_and_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        enchant(dir.path(), Some("gsk_test".to_string()), Some(true)).unwrap();
        let config = GoblinConfig::load_from(GoblinPaths::for_repo(dir.path()).config_file).unwrap();
        assert_eq!(config.groq_api_key.as_deref(), Some("gsk_test"));
        assert!(config.ai_commits_enabled);

        enchant(dir.path(), None, Some(false)).unwrap();
        let config = GoblinConfig::load_from(GoblinPaths::for_repo(dir.path()).config_file).unwrap();
        assert!(!config.ai_commits_enabled);
        assert_eq!(config.groq_api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn blocked_prompt_read_does_not_hold_the_process() {
        let (release, parked) = std::sync::mpsc::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
            let value = run_to_completion(runtime, async move {
                // Stands in for the terminal prompt stuck reading stdin.
                let (started_tx, started) = tokio::sync::oneshot::channel();
                tokio::task::spawn_blocking(move || {
                    let _ = started_tx.send(());
                    parked.recv().ok()
                });
                started.await.unwrap();
                "vanished"
            });
            done_tx.send(value).unwrap();
        });

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok("vanished"));
        drop(release);
    }
}
