mod harvest;

pub(crate) use harvest::Harvester;

use crate::model::NodeConfig;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
#[error("failed to start `{program}` in {workspace}: {source}")]
pub struct SpawnError {
    pub program: String,
    pub workspace: String,
    pub source: std::io::Error,
}

/// A running node process and the tasks draining its output.
pub struct NodeProcess {
    child: Child,
    pumps: Vec<tokio::task::JoinHandle<()>>,
}

impl NodeProcess {
    /// Spawn the node in `workspace` and forward every stdout chunk, in order, to `chunk_tx`.
    pub fn spawn(
        cfg: &NodeConfig,
        workspace: &Path,
        chunk_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&cfg.program);
        cmd.args(&cfg.args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning node: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|source| SpawnError {
            program: cfg.program.clone(),
            workspace: workspace.display().to_string(),
            source,
        })?;
        info!(
            pid = ?child.id(),
            workspace = %workspace.display(),
            "Started local node `{} {}`",
            cfg.program,
            cfg.args.join(" ")
        );

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_stdout(stdout, chunk_tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(log_stderr(stderr)));
        }

        Ok(Self { child, pumps })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status if the process has already terminated.
    pub fn try_exited(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to poll node process: {e}");
                None
            }
        }
    }

    /// Kill the process, wait for it, and stop draining its output.
    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill node process: {e}");
        }
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}

/// Read raw stdout chunks until EOF. Chunk boundaries are arbitrary.
async fn pump_stdout(mut stdout: ChildStdout, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                debug!("Node stdout closed");
                break;
            }
            Ok(n) => {
                if chunk_tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read node stdout: {e}");
                break;
            }
        }
    }
}

/// Node diagnostics (e.g. "not inside a project") only ever appear on stderr.
async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "devnet_supervisor::node", "{line}");
    }
}
