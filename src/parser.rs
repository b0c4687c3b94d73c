//! Account report scanner for the development node's stdout.
//!
//! The node prints its seeded accounts once, bracketed by a disclaimer:
//!
//! ```text
//! WARNING: These accounts, and their private keys, are publicly known.
//! Any funds sent to them on Mainnet or any other live network WILL BE LOST.
//!
//! Account #0: 0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266 (10000 ETH)
//! Private Key: 0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80
//! ...
//! ```
//!
//! Output arrives in arbitrary chunks, so [`OutputBuffer`] accumulates it and
//! [`harvest`] rescans the whole text each time. The report is small, which
//! keeps the rescan cheap.

use crate::model::{Account, AccountSet, DEFAULT_BALANCE};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DISCLAIMER_MARKER: &str =
    "WARNING: These accounts, and their private keys, are publicly known.";
pub const LAST_ACCOUNT_MARKER: &str = "Account #19:";

const ACCOUNT_MARKER: &str = "Account #";
const PRIVATE_KEY_MARKER: &str = "Private Key:";

static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b0x[a-fA-F0-9]{40}\b").expect("address regex should compile"));
static BALANCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((\d+(?:\.\d+)?) ETH\)").expect("balance regex should compile")
});
static PRIVATE_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b0x[a-fA-F0-9]{64}\b").expect("private key regex should compile")
});

/// Growing text buffer fed with raw stdout chunks in arrival order.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
    // Trailing bytes of a UTF-8 sequence cut by a chunk boundary.
    partial: Vec<u8>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.partial.extend_from_slice(chunk);
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.partial[consumed..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    consumed = self.partial.len();
                    break;
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.partial[consumed..valid_end]));
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + bad;
                        }
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.partial.drain(..consumed);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Drop everything accumulated so far.
    pub fn clear(&mut self) {
        self.text.clear();
        self.partial.clear();
    }
}

/// Outcome of scanning the accumulated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Harvest {
    /// The account report has not been fully printed yet.
    Pending,
    /// The report is present and yielded a full account set.
    Complete(AccountSet),
    /// The report has been printed in full but only `found` valid records could be extracted.
    Incomplete { found: usize },
}

/// Both completion markers are present somewhere in `text`.
pub fn report_complete(text: &str) -> bool {
    text.contains(DISCLAIMER_MARKER) && text.contains(LAST_ACCOUNT_MARKER)
}

pub fn harvest(text: &str) -> Harvest {
    if !report_complete(text) {
        return Harvest::Pending;
    }
    let accounts = parse_accounts(text);
    let found = accounts.len();
    match AccountSet::try_from(accounts) {
        Ok(set) => Harvest::Complete(set),
        Err(_) if report_settled(text) => Harvest::Incomplete { found },
        // The last block may still be arriving.
        Err(_) => Harvest::Pending,
    }
}

/// The last account line and the line after it have both been terminated.
fn report_settled(text: &str) -> bool {
    text.rfind(LAST_ACCOUNT_MARKER)
        .map(|pos| text[pos..].matches('\n').count() >= 2)
        .unwrap_or(false)
}

/// Address and balance captured from an `Account #` line, waiting for its key.
struct PendingAccount {
    address: String,
    balance: String,
}

/// Extract every complete account record from `text`, in encounter order.
pub fn parse_accounts(text: &str) -> Vec<Account> {
    let mut accounts = Vec::new();
    let mut pending: Option<PendingAccount> = None;

    for line in text.lines() {
        if line.contains(ACCOUNT_MARKER) {
            pending = ADDRESS_PATTERN.find(line).map(|address| PendingAccount {
                address: address.as_str().to_string(),
                balance: BALANCE_PATTERN
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| DEFAULT_BALANCE.to_string()),
            });
        } else if line.contains(PRIVATE_KEY_MARKER) {
            let Some(key) = PRIVATE_KEY_PATTERN.find(line) else {
                continue;
            };
            // A key only counts when its address line came first.
            if let Some(PendingAccount { address, balance }) = pending.take() {
                accounts.push(Account {
                    address,
                    balance,
                    private_key: key.as_str().to_string(),
                });
            }
        }
    }

    accounts
}
