//! Per-workspace persistence of harvested account sets.

use crate::model::{Account, AccountSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access account state at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("account state at {} is malformed", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not determine a data directory for account state")]
    NoDataDir,
}

/// Document written for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccounts {
    pub workspace: String,
    #[serde(default)]
    pub harvested_at: String,
    pub accounts: Vec<Account>,
}

/// Key-value backend for the registry. Keys are opaque workspace identifiers.
pub trait AccountStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<StoredAccounts>, StoreError>;
    fn store(&self, key: &str, record: &StoredAccounts) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// One JSON file per workspace under a state directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory.
    pub fn in_data_dir() -> Result<Self, StoreError> {
        let base = dirs::data_local_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(base.join("devnet-supervisor").join("accounts")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl AccountStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<StoredAccounts>, StoreError> {
        let path = self.path_for(key);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| StoreError::Malformed { path, source })
    }

    fn store(&self, key: &str, record: &StoredAccounts) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(key);
        let data = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        // Write then rename so a reader never sees a half-written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, StoredAccounts>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredAccounts>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AccountStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<StoredAccounts>, StoreError> {
        Ok(self.records().get(key).cloned())
    }

    fn store(&self, key: &str, record: &StoredAccounts) -> Result<(), StoreError> {
        self.records().insert(key.to_string(), record.clone());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.records().remove(key);
        Ok(())
    }
}

/// Account sets keyed by workspace root.
#[derive(Clone)]
pub struct AccountRegistry {
    store: Arc<dyn AccountStore>,
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry").finish_non_exhaustive()
    }
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Stored accounts for `workspace`, empty when nothing was harvested yet.
    pub fn load(&self, workspace: &Path) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .store
            .load(&workspace_key(workspace))?
            .map(|record| record.accounts)
            .unwrap_or_default())
    }

    /// The stored set, only if it is complete and every record is well formed.
    pub fn cached(&self, workspace: &Path) -> Result<Option<AccountSet>, StoreError> {
        let accounts = self.load(workspace)?;
        if !accounts.iter().all(Account::is_valid) {
            debug!(workspace = %workspace.display(), "ignoring stored accounts with invalid records");
            return Ok(None);
        }
        Ok(AccountSet::try_from(accounts).ok())
    }

    pub fn store(&self, workspace: &Path, accounts: &AccountSet) -> Result<(), StoreError> {
        let record = StoredAccounts {
            workspace: workspace.display().to_string(),
            harvested_at: now_rfc3339(),
            accounts: accounts.as_slice().to_vec(),
        };
        self.store.store(&workspace_key(workspace), &record)
    }

    pub fn reset(&self, workspace: &Path) -> Result<(), StoreError> {
        self.store.clear(&workspace_key(workspace))
    }
}

/// Stable identifier for a workspace root: a SHA-256 prefix of its canonical path.
pub fn workspace_key(workspace: &Path) -> String {
    let canonical = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(&digest[..16])
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_accounts;

    fn full_set() -> AccountSet {
        AccountSet::try_from(sample_accounts()).unwrap()
    }

    #[test]
    fn file_store_round_trips_a_workspace() {
        let state = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let registry = AccountRegistry::new(Arc::new(FileStore::new(state.path())));

        assert!(registry.load(workspace.path()).unwrap().is_empty());
        assert_eq!(registry.cached(workspace.path()).unwrap(), None);

        registry.store(workspace.path(), &full_set()).unwrap();
        assert_eq!(registry.load(workspace.path()).unwrap(), sample_accounts());
        assert_eq!(registry.cached(workspace.path()).unwrap(), Some(full_set()));

        // A fresh registry over the same directory sees the same state.
        let reopened = AccountRegistry::new(Arc::new(FileStore::new(state.path())));
        assert_eq!(reopened.cached(workspace.path()).unwrap(), Some(full_set()));
    }

    #[test]
    fn stored_document_uses_camel_case_keys() {
        let state = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let registry = AccountRegistry::new(Arc::new(FileStore::new(state.path())));
        registry.store(workspace.path(), &full_set()).unwrap();

        let path = state
            .path()
            .join(format!("{}.json", workspace_key(workspace.path())));
        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(doc["accounts"].as_array().unwrap().len(), 20);
        assert!(doc["accounts"][0]["privateKey"].is_string());
        assert!(!doc["harvested_at"].as_str().unwrap().is_empty());
    }

    #[test]
    fn reset_only_touches_one_workspace() {
        let registry = AccountRegistry::new(Arc::new(MemoryStore::new()));
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        registry.store(a.path(), &full_set()).unwrap();
        registry.store(b.path(), &full_set()).unwrap();

        registry.reset(a.path()).unwrap();
        registry.reset(a.path()).unwrap();
        assert!(registry.load(a.path()).unwrap().is_empty());
        assert_eq!(registry.cached(b.path()).unwrap(), Some(full_set()));
    }

    #[test]
    fn partial_or_invalid_state_is_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let registry = AccountRegistry::new(store.clone());
        let workspace = Path::new("/tmp/devnet-workspace");
        let key = workspace_key(workspace);

        let mut partial = sample_accounts();
        partial.truncate(7);
        store
            .store(
                &key,
                &StoredAccounts {
                    workspace: workspace.display().to_string(),
                    harvested_at: String::new(),
                    accounts: partial,
                },
            )
            .unwrap();
        assert_eq!(registry.load(workspace).unwrap().len(), 7);
        assert_eq!(registry.cached(workspace).unwrap(), None);

        let mut corrupted = sample_accounts();
        corrupted[4].address = "0xnope".into();
        store
            .store(
                &key,
                &StoredAccounts {
                    workspace: workspace.display().to_string(),
                    harvested_at: String::new(),
                    accounts: corrupted,
                },
            )
            .unwrap();
        assert_eq!(registry.cached(workspace).unwrap(), None);
    }

    #[test]
    fn malformed_file_is_reported() {
        let state = tempfile::tempdir().unwrap();
        let workspace = Path::new("/tmp/devnet-malformed");
        std::fs::write(
            state.path().join(format!("{}.json", workspace_key(workspace))),
            b"{ not json",
        )
        .unwrap();
        let registry = AccountRegistry::new(Arc::new(FileStore::new(state.path())));
        assert!(matches!(
            registry.load(workspace),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn workspace_key_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(workspace_key(dir.path()), workspace_key(dir.path()));
        assert_eq!(workspace_key(dir.path()).len(), 32);
        assert_ne!(
            workspace_key(dir.path()),
            workspace_key(&dir.path().join("nested"))
        );
    }
}
