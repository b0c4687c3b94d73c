//! Fixtures shared by unit tests.

use crate::model::{Account, ACCOUNT_COUNT};
use crate::parser::DISCLAIMER_MARKER;

pub(crate) fn sample_account(index: usize) -> Account {
    Account {
        address: format!("0x{:040x}", 0xa11ce000 + index),
        balance: "10000".to_string(),
        private_key: format!("0x{:064x}", 0xbeef0000 + index),
    }
}

pub(crate) fn sample_accounts() -> Vec<Account> {
    (0..ACCOUNT_COUNT).map(sample_account).collect()
}

/// Render `count` account blocks the way the node prints them on startup.
pub(crate) fn node_banner(count: usize) -> String {
    let mut out = String::from(
        "Started HTTP and WebSocket JSON-RPC server at http://127.0.0.1:8545/\n\nAccounts\n========\n\n",
    );
    out.push_str(DISCLAIMER_MARKER);
    out.push_str("\nAny funds sent to them on Mainnet or any other live network WILL BE LOST.\n\n");
    for index in 0..count {
        let account = sample_account(index);
        out.push_str(&format!(
            "Account #{index}: {} ({} ETH)\nPrivate Key: {}\n\n",
            account.address, account.balance, account.private_key
        ));
    }
    out.push_str(DISCLAIMER_MARKER);
    out.push_str("\nAny funds sent to them on Mainnet or any other live network WILL BE LOST.\n");
    out
}
