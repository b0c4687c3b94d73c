//! Local node supervisor.
//!
//! Starts the node at most once, serves cached accounts without spawning, and
//! tears the node down on request.

use crate::engine::{Harvester, NodeProcess};
use crate::model::{NodeConfig, Notification};
use crate::storage::AccountRegistry;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};

/// What a start request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    /// A complete account set was already stored and has been delivered.
    Cached,
    /// A node is already running; nothing was spawned.
    AlreadyRunning,
    /// A new node was spawned; accounts will be delivered once harvested.
    Spawned,
    /// Spawning failed and an error was delivered.
    Failed,
}

struct RunningNode {
    process: NodeProcess,
    harvester: tokio::task::JoinHandle<()>,
    workspace: PathBuf,
}

pub(crate) struct Supervisor {
    cfg: NodeConfig,
    registry: AccountRegistry,
    node: Option<RunningNode>,
}

impl Supervisor {
    pub fn new(cfg: NodeConfig, registry: AccountRegistry) -> Self {
        Self {
            cfg,
            registry,
            node: None,
        }
    }

    pub fn start(
        &mut self,
        workspace: &Path,
        sink: &UnboundedSender<Notification>,
    ) -> StartOutcome {
        match self.registry.cached(workspace) {
            Ok(Some(accounts)) => {
                info!(workspace = %workspace.display(), "Serving cached accounts");
                let _ = sink.send(Notification::Accounts { accounts });
                return StartOutcome::Cached;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read cached accounts, starting a fresh node: {e:#}"),
        }

        self.reap();
        if let Some(node) = &self.node {
            info!(
                pid = ?node.process.id(),
                workspace = %node.workspace.display(),
                "Local node already running"
            );
            return StartOutcome::AlreadyRunning;
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let process = match NodeProcess::spawn(&self.cfg, workspace, chunk_tx) {
            Ok(process) => process,
            Err(e) => {
                error!("{e}");
                let _ = sink.send(Notification::error(e.to_string()));
                return StartOutcome::Failed;
            }
        };

        let harvester = Harvester {
            registry: self.registry.clone(),
            workspace: workspace.to_path_buf(),
            policy: self.cfg.harvest_policy,
            sink: sink.clone(),
        };
        self.node = Some(RunningNode {
            process,
            harvester: tokio::spawn(harvester.run(chunk_rx)),
            workspace: workspace.to_path_buf(),
        });
        StartOutcome::Spawned
    }

    /// Kill the running node, if any. Returns whether a node was stopped.
    ///
    /// Unharvested output is discarded; stored accounts are kept.
    pub async fn stop(&mut self) -> bool {
        let Some(node) = self.node.take() else {
            return false;
        };
        info!(pid = ?node.process.id(), "Stopping local node");
        node.harvester.abort();
        node.process.kill().await;
        true
    }

    /// Drop the handle of a node that exited on its own.
    ///
    /// The harvest task is left to finish on its own: output the node printed
    /// before exiting may still be queued.
    pub fn reap(&mut self) -> Option<ExitStatus> {
        let status = self.node.as_mut()?.process.try_exited()?;
        warn!("Local node exited unexpectedly ({status})");
        self.node = None;
        Some(status)
    }

    #[cfg(test)]
    pub fn is_running(&mut self) -> bool {
        self.reap();
        self.node.is_some()
    }
}
