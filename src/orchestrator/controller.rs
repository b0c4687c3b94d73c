//! Node lifecycle controller.
//!
//! Owns the supervisor and serializes every start/stop request, emitting
//! notifications for presentation layers.

use super::supervisor::{StartOutcome, Supervisor};
use crate::model::Notification;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::Duration;
use tracing::debug;

/// Commands emitted by UI layers to control the local node.
#[derive(Debug)]
pub(crate) enum NodeCommand {
    Start {
        workspace: PathBuf,
        reply: Option<oneshot::Sender<StartOutcome>>,
    },
    Stop,
    Quit,
}

/// Process node commands until `Quit` (or the command channel closes), then stop the node.
pub(crate) async fn run_controller(
    mut supervisor: Supervisor,
    event_tx: UnboundedSender<Notification>,
    mut cmd_rx: UnboundedReceiver<NodeCommand>,
) -> Result<()> {
    // A node that dies on its own must not block the next start request.
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(NodeCommand::Start { workspace, reply }) => {
                        let outcome = supervisor.start(&workspace, &event_tx);
                        debug!(?outcome, "Start request handled");
                        if let Some(reply) = reply {
                            let _ = reply.send(outcome);
                        }
                    }
                    Some(NodeCommand::Stop) => {
                        supervisor.stop().await;
                    }
                    Some(NodeCommand::Quit) | None => {
                        supervisor.stop().await;
                        break;
                    }
                }
            }
            _ = watchdog.tick() => {
                supervisor.reap();
            }
        }
    }

    Ok(())
}
