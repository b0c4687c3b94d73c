use crate::model::{HarvestPolicy, NodeConfig, Notification};
use crate::orchestrator::{run_controller, NodeCommand, StartOutcome, Supervisor};
use crate::storage::{AccountRegistry, AccountStore, FileStore, MemoryStore};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Messages for the terminal printer.
enum Printed {
    Notification(Notification),
    Hint(String),
}

/// Print on a blocking thread so terminal writes never stall the runtime.
///
/// Accounts go to stdout; errors and hints go to stderr.
fn spawn_printer(
    workspace: PathBuf,
    json: bool,
) -> (
    mpsc::UnboundedSender<Printed>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Printed>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = std::io::LineWriter::new(std::io::stdout().lock());
        let mut err = std::io::LineWriter::new(std::io::stderr().lock());

        while let Some(msg) = rx.blocking_recv() {
            let written = match msg {
                Printed::Notification(notification) => {
                    print_notification(&mut out, &mut err, &workspace, json, &notification)
                }
                Printed::Hint(hint) => writeln!(err, "{hint}"),
            };
            if let Err(e) = written {
                warn!("Failed to write to the terminal: {e}");
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

fn print_notification(
    out: &mut impl Write,
    err: &mut impl Write,
    workspace: &Path,
    json: bool,
    notification: &Notification,
) -> std::io::Result<()> {
    if json {
        let line = serde_json::to_string(notification).map_err(std::io::Error::from)?;
        return writeln!(out, "{line}");
    }
    let target: &mut dyn Write = match notification {
        Notification::Accounts { .. } => out,
        Notification::Error { .. } => err,
    };
    for line in crate::text_summary::build_text_summary(workspace, notification).lines {
        writeln!(target, "{line}")?;
    }
    Ok(())
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "devnet-supervisor",
    version,
    about = "Run a local development node once per workspace and harvest its seeded accounts"
)]
pub struct Cli {
    /// Project root the node runs in (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Directory holding harvested account state
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Keep harvested accounts in memory only
    #[arg(long, global = true, conflicts_with = "state_dir")]
    pub ephemeral: bool,

    /// Print notifications as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Start the local node (or serve cached accounts) and keep it running until Ctrl-C
    Node(NodeArgs),
    /// Print the cached accounts for the workspace
    Accounts,
    /// Forget the cached accounts for the workspace
    Reset,
}

#[derive(Debug, Args, Clone)]
pub struct NodeArgs {
    /// Executable that launches the node
    #[arg(long, default_value = "npx")]
    pub program: String,

    /// What to do when the account report yields fewer than 20 accounts
    #[arg(long, value_enum, default_value_t = HarvestPolicy::Warn)]
    pub on_incomplete: HarvestPolicy,

    /// Stop the node as soon as the accounts have been printed
    #[arg(long)]
    pub exit_after_harvest: bool,

    /// Arguments passed to the program
    #[arg(last = true, default_values = ["hardhat", "node"])]
    pub args: Vec<String>,
}

pub async fn run(args: Cli) -> Result<()> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    let registry = build_registry(&args)?;

    match &args.command {
        Command::Node(node) => run_node(&args, node, workspace, registry).await,
        Command::Accounts => show_accounts(&args, &workspace, &registry),
        Command::Reset => {
            registry
                .reset(&workspace)
                .context("failed to clear cached accounts")?;
            eprintln!("Cleared cached accounts for {}", workspace.display());
            Ok(())
        }
    }
}

/// Build a `NodeConfig` from CLI arguments.
pub fn build_config(args: &NodeArgs) -> NodeConfig {
    NodeConfig {
        program: args.program.clone(),
        args: args.args.clone(),
        harvest_policy: args.on_incomplete,
    }
}

fn resolve_workspace(workspace: Option<&Path>) -> Result<PathBuf> {
    let workspace = match workspace {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    if !workspace.is_dir() {
        bail!("workspace {} is not a directory", workspace.display());
    }
    Ok(workspace)
}

fn build_registry(args: &Cli) -> Result<AccountRegistry> {
    let store: Arc<dyn AccountStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let store = match args.state_dir.as_ref() {
            Some(dir) => FileStore::new(dir),
            None => FileStore::in_data_dir()?,
        };
        info!("Account state directory: {}", store.dir().display());
        Arc::new(store)
    };
    Ok(AccountRegistry::new(store))
}

async fn run_node(
    args: &Cli,
    node: &NodeArgs,
    workspace: PathBuf,
    registry: AccountRegistry,
) -> Result<()> {
    let supervisor = Supervisor::new(build_config(node), registry);
    let (print_tx, printer) = spawn_printer(workspace.clone(), args.json);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Notification>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<NodeCommand>();
    let controller = tokio::spawn(run_controller(supervisor, event_tx, cmd_rx));

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(NodeCommand::Start {
            workspace: workspace.clone(),
            reply: Some(reply_tx),
        })
        .context("node controller is not running")?;
    let outcome = reply_rx
        .await
        .context("node controller dropped the start request")?;

    let mut failure = None;
    loop {
        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { break };
                let _ = print_tx.send(Printed::Notification(ev.clone()));
                match ev {
                    // Spawn failures, early exits and (with `notify`) short reports.
                    Notification::Error { message } => {
                        failure = Some(message);
                        break;
                    }
                    Notification::Accounts { .. } if outcome == StartOutcome::Cached => {
                        let _ = print_tx.send(Printed::Hint(
                            "Served from cache; run `reset` to harvest from a fresh node.".into(),
                        ));
                        break;
                    }
                    Notification::Accounts { .. } if node.exit_after_harvest => break,
                    Notification::Accounts { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping local node");
                break;
            }
        }
    }

    // Quit stops the node before the controller returns.
    let _ = cmd_tx.send(NodeCommand::Quit);
    controller.await.context("node controller task failed")??;

    drop(print_tx);
    let _ = printer.await;

    if let Some(message) = failure {
        bail!("local node failed: {message}");
    }
    Ok(())
}

fn show_accounts(args: &Cli, workspace: &Path, registry: &AccountRegistry) -> Result<()> {
    let cached = registry
        .cached(workspace)
        .context("failed to read cached accounts")?;
    match cached {
        Some(accounts) if args.json => {
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
        Some(accounts) => {
            let summary = crate::text_summary::build_account_summary(workspace, &accounts);
            for line in summary.lines {
                println!("{line}");
            }
        }
        None if args.json => println!("[]"),
        None => eprintln!("No accounts cached for {}", workspace.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccountSet;
    use crate::test_support::sample_accounts;

    #[test]
    fn node_defaults_to_hardhat() {
        let cli = Cli::try_parse_from(["devnet-supervisor", "node"]).unwrap();
        let Command::Node(node) = &cli.command else {
            panic!("expected node command");
        };
        let cfg = build_config(node);
        assert_eq!(cfg.program, "npx");
        assert_eq!(cfg.args, vec!["hardhat", "node"]);
        assert_eq!(cfg.harvest_policy, HarvestPolicy::Warn);
        assert!(!cli.ephemeral);
    }

    #[test]
    fn node_accepts_custom_command() {
        let cli = Cli::try_parse_from([
            "devnet-supervisor",
            "--json",
            "node",
            "--program",
            "anvil-wrapper",
            "--on-incomplete",
            "notify",
            "--",
            "--port",
            "9545",
        ])
        .unwrap();
        let Command::Node(node) = &cli.command else {
            panic!("expected node command");
        };
        let cfg = build_config(node);
        assert_eq!(cfg.program, "anvil-wrapper");
        assert_eq!(cfg.args, vec!["--port", "9545"]);
        assert_eq!(cfg.harvest_policy, HarvestPolicy::Notify);
        assert!(cli.json);
    }

    #[test]
    fn ephemeral_conflicts_with_state_dir() {
        assert!(Cli::try_parse_from([
            "devnet-supervisor",
            "--ephemeral",
            "--state-dir",
            "/tmp/state",
            "accounts",
        ])
        .is_err());
    }

    #[test]
    fn accounts_print_to_stdout_and_errors_to_stderr() {
        let set = AccountSet::try_from(sample_accounts()).unwrap();
        let accounts = Notification::Accounts { accounts: set };
        let (mut out, mut err) = (Vec::new(), Vec::new());

        print_notification(&mut out, &mut err, Path::new("/work/dapp"), false, &accounts).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Accounts for /work/dapp\n"));
        assert!(err.is_empty());

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let failed = Notification::error("node exited");
        print_notification(&mut out, &mut err, Path::new("."), false, &failed).unwrap();
        assert!(out.is_empty());
        assert_eq!(String::from_utf8(err).unwrap(), "Error: node exited\n");
    }

    #[test]
    fn json_notifications_go_to_stdout() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let failed = Notification::error("node exited");
        print_notification(&mut out, &mut err, Path::new("."), true, &failed).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"type\":\"error\",\"message\":\"node exited\"}\n"
        );
        assert!(err.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn node_command_fails_when_node_exits_early() {
        let workspace = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "devnet-supervisor",
            "--ephemeral",
            "--workspace",
            workspace.path().to_str().unwrap(),
            "node",
            "--program",
            "sh",
            "--",
            "-c",
            "echo 'Error HH1: not inside a project' >&2; exit 1",
        ])
        .unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(10), run(cli))
            .await
            .expect("node command should return once the node exits");
        assert!(result.is_err());
    }

    #[test]
    fn workspace_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_workspace(Some(dir.path())).unwrap(), dir.path());

        let file = dir.path().join("hardhat.config.js");
        std::fs::write(&file, "module.exports = {};").unwrap();
        assert!(resolve_workspace(Some(&file)).is_err());
    }
}
