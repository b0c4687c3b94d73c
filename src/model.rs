use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of accounts a development node seeds and reports on startup.
pub const ACCOUNT_COUNT: usize = 20;

/// Balance recorded when an account line carries no `(<amount> ETH)` suffix.
pub const DEFAULT_BALANCE: &str = "10000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub harvest_policy: HarvestPolicy,
}

/// What to do when the account report is complete but does not yield a full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HarvestPolicy {
    /// Keep consuming output without any trace.
    Silent,
    /// Log a warning once per node.
    #[default]
    Warn,
    /// Send an error notification once per node.
    Notify,
}

/// One account seeded by the development node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    pub balance: String,
    pub private_key: String,
}

impl Account {
    /// Check the fixed-length hex shape of address and private key.
    pub fn is_valid(&self) -> bool {
        is_prefixed_hex(&self.address, 40) && is_prefixed_hex(&self.private_key, 64)
    }
}

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    value
        .strip_prefix("0x")
        .map(|hex| hex.len() == digits && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} accounts, found {found}", expected = ACCOUNT_COUNT)]
pub struct IncompleteAccounts {
    pub found: usize,
}

/// The complete, ordered account report of one node (`Account #0` .. `Account #19`).
///
/// Only constructible from exactly [`ACCOUNT_COUNT`] records, so a partial set
/// can never be stored or handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Account>", into = "Vec<Account>")]
pub struct AccountSet(Vec<Account>);

impl AccountSet {
    pub fn as_slice(&self) -> &[Account] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Account> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Account>> for AccountSet {
    type Error = IncompleteAccounts;

    fn try_from(accounts: Vec<Account>) -> Result<Self, Self::Error> {
        if accounts.len() == ACCOUNT_COUNT {
            Ok(Self(accounts))
        } else {
            Err(IncompleteAccounts {
                found: accounts.len(),
            })
        }
    }
}

impl From<AccountSet> for Vec<Account> {
    fn from(set: AccountSet) -> Self {
        set.0
    }
}

/// Messages delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    Accounts { accounts: AccountSet },
    Error { message: String },
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Notification::Error {
            message: message.into(),
        }
    }
}
