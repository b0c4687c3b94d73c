//! Harvest task: the single consumer of a node's stdout chunks.

use crate::model::{HarvestPolicy, Notification, ACCOUNT_COUNT};
use crate::parser::{self, Harvest, OutputBuffer};
use crate::storage::AccountRegistry;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

pub(crate) struct Harvester {
    pub registry: AccountRegistry,
    pub workspace: PathBuf,
    pub policy: HarvestPolicy,
    pub sink: UnboundedSender<Notification>,
}

/// Where the account report stands in the node's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Report {
    Waiting,
    Harvested,
    Incomplete,
}

impl Harvester {
    /// Consume chunks until the node's stdout closes or the task is aborted.
    ///
    /// The registry is written and the sink notified at most once. Once the
    /// report has been dealt with, output is drained without being kept so the
    /// node never blocks on a full pipe. If stdout closes first, the sink gets
    /// a single error.
    pub async fn run(self, mut chunk_rx: UnboundedReceiver<Vec<u8>>) {
        let mut buffer = OutputBuffer::new();
        let mut report = Report::Waiting;

        while let Some(chunk) = chunk_rx.recv().await {
            if report != Report::Waiting {
                continue;
            }
            buffer.push(&chunk);

            match parser::harvest(buffer.as_str()) {
                Harvest::Pending => {}
                Harvest::Complete(accounts) => {
                    report = Report::Harvested;
                    buffer.clear();
                    info!(
                        workspace = %self.workspace.display(),
                        "Harvested {} accounts from local node",
                        ACCOUNT_COUNT
                    );
                    if let Err(e) = self.registry.store(&self.workspace, &accounts) {
                        error!("Failed to persist harvested accounts: {e:#}");
                    }
                    let _ = self.sink.send(Notification::Accounts { accounts });
                }
                Harvest::Incomplete { found } => {
                    // A settled report cannot complete later.
                    report = Report::Incomplete;
                    buffer.clear();
                    self.report_incomplete(found);
                }
            }
        }

        let notified = match report {
            Report::Harvested => true,
            Report::Incomplete => self.policy == HarvestPolicy::Notify,
            Report::Waiting => false,
        };
        if !notified {
            warn!(
                workspace = %self.workspace.display(),
                "Local node output ended before a complete account report"
            );
            let _ = self.sink.send(Notification::error(
                "local node output ended before a complete account report",
            ));
        }
    }

    fn report_incomplete(&self, found: usize) {
        match self.policy {
            HarvestPolicy::Silent => {}
            HarvestPolicy::Warn => warn!(
                "Account report is complete but only {found} of {ACCOUNT_COUNT} accounts could be parsed"
            ),
            HarvestPolicy::Notify => {
                let _ = self.sink.send(Notification::error(format!(
                    "local node reported {found} of {ACCOUNT_COUNT} accounts"
                )));
            }
        }
    }
}
