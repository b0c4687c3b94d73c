//! Text rendering of notifications for CLI output.

use crate::model::{AccountSet, Notification};
use std::path::Path;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_account_summary(workspace: &Path, accounts: &AccountSet) -> TextSummary {
    let mut lines = vec![
        format!("Accounts for {}", workspace.display()),
        String::new(),
    ];
    for (index, account) in accounts.iter().enumerate() {
        lines.push(format!(
            "Account #{index:<2} {} ({} ETH)",
            account.address, account.balance
        ));
        lines.push(format!("            {}", account.private_key));
    }
    TextSummary { lines }
}

pub(crate) fn build_text_summary(workspace: &Path, notification: &Notification) -> TextSummary {
    match notification {
        Notification::Accounts { accounts } => build_account_summary(workspace, accounts),
        Notification::Error { message } => TextSummary {
            lines: vec![format!("Error: {message}")],
        },
    }
}
