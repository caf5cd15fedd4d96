//! Per-instance key-value state.
//!
//! The reconciler persists three keys per instance: `stackId`, `tfvars_hash`
//! and `mode`. [`BlockStore`] is the narrow primitive the host provides;
//! [`InstanceState`] layers the typed reconcile state on top of it.
//!
//! `tfvars_hash` and `mode` are only ever written together through one
//! `set_many` call. Both bundled stores apply `set_many` atomically. For a
//! backend that cannot, entries are ordered mode first so an interrupted write
//! leaves `state_polling` with the old hash: the next passes poll, clear the
//! mode and then re-detect the change, rather than silently skipping it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::fingerprint::{sha256_hex, Fingerprint};
use crate::{Error, Result};

/// Key holding the remote stack id
pub const STACK_ID_KEY: &str = "stackId";
/// Key holding the fingerprint of the last pushed configuration
pub const TFVARS_HASH_KEY: &str = "tfvars_hash";
/// Key holding the reconcile mode
pub const MODE_KEY: &str = "mode";
/// Persisted value of [`Mode::StatePolling`]
pub const STATE_POLLING: &str = "state_polling";

/// Scope characters kept readable in [`JsonFileStore`] file names
const FILE_STEM_PREFIX_LEN: usize = 48;

/// Trait abstracting the host's scoped key-value primitive
///
/// `scope` is the instance id; no two instances share keys.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Read one key
    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>>;

    /// Write several keys in one call
    async fn set_many(&self, scope: &str, entries: &[(String, String)]) -> Result<()>;

    /// Remove keys; missing keys are ignored
    async fn delete(&self, scope: &str, keys: &[String]) -> Result<()>;
}

/// Whether the instance is waiting on a remote run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// No remote operation outstanding (key absent)
    #[default]
    Idle,
    /// A run was triggered and has not reached a terminal state
    StatePolling,
}

/// Reconcile state as read at the start of a pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileState {
    /// Remote stack id, once provisioned
    pub stack_id: Option<String>,
    /// Fingerprint of the last configuration pushed
    pub tfvars_hash: Option<Fingerprint>,
    /// Current mode
    pub mode: Mode,
}

/// Typed view of one instance's keys
#[derive(Clone)]
pub struct InstanceState {
    store: Arc<dyn BlockStore>,
    instance_id: String,
}

impl InstanceState {
    /// Bind the store to an instance
    pub fn new(store: Arc<dyn BlockStore>, instance_id: impl Into<String>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
        }
    }

    /// Read all reconcile keys
    pub async fn load(&self) -> Result<ReconcileState> {
        let stack_id = self
            .store
            .get(&self.instance_id, STACK_ID_KEY)
            .await?
            .filter(|id| !id.is_empty());
        let tfvars_hash = self
            .store
            .get(&self.instance_id, TFVARS_HASH_KEY)
            .await?
            .map(Fingerprint::from_hex);
        let mode = match self.store.get(&self.instance_id, MODE_KEY).await?.as_deref() {
            None => Mode::Idle,
            Some(STATE_POLLING) => Mode::StatePolling,
            Some(other) => {
                warn!(
                    instance = %self.instance_id,
                    mode = other,
                    "ignoring unknown persisted mode"
                );
                Mode::Idle
            }
        };

        Ok(ReconcileState {
            stack_id,
            tfvars_hash,
            mode,
        })
    }

    /// Persist a freshly created stack id
    pub async fn record_stack_id(&self, stack_id: &str) -> Result<()> {
        self.store
            .set_many(
                &self.instance_id,
                &[(STACK_ID_KEY.to_string(), stack_id.to_string())],
            )
            .await
    }

    /// Persist the pushed fingerprint and enter `state_polling` together
    pub async fn enter_polling(&self, hash: &Fingerprint) -> Result<()> {
        self.store
            .set_many(
                &self.instance_id,
                &[
                    (MODE_KEY.to_string(), STATE_POLLING.to_string()),
                    (TFVARS_HASH_KEY.to_string(), hash.as_str().to_string()),
                ],
            )
            .await
    }

    /// Leave `state_polling`
    pub async fn clear_polling(&self) -> Result<()> {
        self.store
            .delete(&self.instance_id, &[MODE_KEY.to_string()])
            .await
    }
}

/// Process-local store; `set_many` is atomic under a single lock.
#[derive(Default)]
pub struct MemoryStore {
    scopes: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every key in a scope
    pub fn snapshot(&self, scope: &str) -> BTreeMap<String, String> {
        self.scopes.lock().get(scope).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .scopes
            .lock()
            .get(scope)
            .and_then(|keys| keys.get(key).cloned()))
    }

    async fn set_many(&self, scope: &str, entries: &[(String, String)]) -> Result<()> {
        let mut scopes = self.scopes.lock();
        let keys = scopes.entry(scope.to_string()).or_default();
        for (key, value) in entries {
            keys.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, scope: &str, keys: &[String]) -> Result<()> {
        if let Some(existing) = self.scopes.lock().get_mut(scope) {
            for key in keys {
                existing.remove(key);
            }
        }
        Ok(())
    }
}

/// One JSON document per instance under a directory.
///
/// Every write rewrites the whole document through a temp file and a rename,
/// so `set_many` either lands completely or not at all.
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Store documents under `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the document for a scope.
    ///
    /// The file name is a readable, sanitized prefix of the scope followed by
    /// the SHA-256 of the raw scope, so distinct scopes never share a file even
    /// when they sanitize to the same prefix.
    pub fn path_for(&self, scope: &str) -> Result<PathBuf> {
        if scope.is_empty() {
            return Err(Error::store(scope, "instance scope must not be empty"));
        }
        let readable: String = scope
            .chars()
            .take(FILE_STEM_PREFIX_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Ok(self.dir.join(format!("{readable}.{}.json", sha256_hex(scope))))
    }

    async fn read_document(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(body) => serde_json::from_str(&body).map_err(|e| {
                Error::store(path.display().to_string(), format!("corrupt state file: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::store(path.display().to_string(), e.to_string())),
        }
    }

    async fn write_document(&self, path: &Path, document: &BTreeMap<String, String>) -> Result<()> {
        let body = serde_json::to_string_pretty(document)?;
        let location = path.display().to_string();

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::store(&location, format!("failed to create state dir: {e}")))?;

        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| Error::store(&location, format!("failed to write temp file: {e}")))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::store(&location, format!("failed to replace state file: {e}")))?;

        debug!(path = %location, keys = document.len(), "state file written");
        Ok(())
    }
}

#[async_trait]
impl BlockStore for JsonFileStore {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        let path = self.path_for(scope)?;
        Ok(self.read_document(&path).await?.remove(key))
    }

    async fn set_many(&self, scope: &str, entries: &[(String, String)]) -> Result<()> {
        let path = self.path_for(scope)?;
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document(&path).await?;
        for (key, value) in entries {
            document.insert(key.clone(), value.clone());
        }
        self.write_document(&path, &document).await
    }

    async fn delete(&self, scope: &str, keys: &[String]) -> Result<()> {
        let path = self.path_for(scope)?;
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document(&path).await?;
        let before = document.len();
        for key in keys {
            document.remove(key);
        }
        if document.len() == before {
            return Ok(());
        }
        self.write_document(&path, &document).await
    }
}
