//! Serialized, snapshot-read cache over an [`AuditLog`].

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use tracing::{debug, instrument};

use super::{validate_name, AuditLog, CommitId};
use crate::error::RgetError;

/// Key/value cache whose every mutation is an audit commit.
///
/// Writers are serialized by a single mutex held across commit and push.
/// Readers see an in-memory snapshot that only changes after a mutation
/// has been committed and pushed, so they never observe an in-flight or
/// rolled-back write.
pub struct ContentAddressableCache<L: AuditLog> {
    log: Mutex<L>,
    snapshot: RwLock<BTreeMap<String, Vec<u8>>>,
}

/// Result of [`ContentAddressableCache::put_unclaimed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The new entry was committed.
    Stored(CommitId),
    /// An entry with the prefix was already present; nothing was written.
    Existing(String),
}

fn poisoned(what: &str) -> RgetError {
    RgetError::CacheUnavailable {
        message: format!("{what} lock poisoned"),
    }
}

impl<L: AuditLog> ContentAddressableCache<L> {
    /// Wrap `log`, loading its committed entries.
    pub fn new(log: L) -> Result<Self, RgetError> {
        let snapshot = log.entries()?;
        debug!(entries = snapshot.len(), "Loaded cache snapshot");
        Ok(Self {
            log: Mutex::new(log),
            snapshot: RwLock::new(snapshot),
        })
    }

    /// Contents of `name`.
    pub fn get(&self, name: &str) -> Result<Vec<u8>, RgetError> {
        self.snapshot
            .read()
            .map_err(|_| poisoned("snapshot"))?
            .get(name)
            .cloned()
            .ok_or_else(|| RgetError::NotFound { name: name.into() })
    }

    /// Whether `name` exists.
    pub fn contains(&self, name: &str) -> Result<bool, RgetError> {
        Ok(self
            .snapshot
            .read()
            .map_err(|_| poisoned("snapshot"))?
            .contains_key(name))
    }

    /// Sorted names beginning with `prefix`.
    pub fn prefix_search(&self, prefix: &str) -> Result<Vec<String>, RgetError> {
        let snapshot = self.snapshot.read().map_err(|_| poisoned("snapshot"))?;
        Ok(snapshot
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize, RgetError> {
        Ok(self.snapshot.read().map_err(|_| poisoned("snapshot"))?.len())
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> Result<bool, RgetError> {
        Ok(self.len()? == 0)
    }

    /// Store `data` under `name`; returns once the commit is pushed.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn put(&self, name: &str, data: &[u8]) -> Result<CommitId, RgetError> {
        validate_name(name)?;
        let mut log = self.log.lock().map_err(|_| poisoned("writer"))?;
        let id = log.append(name, data)?;
        self.snapshot
            .write()
            .map_err(|_| poisoned("snapshot"))?
            .insert(name.to_string(), data.to_vec());
        Ok(id)
    }

    /// Store `data` under `name` unless some entry already starts with
    /// `prefix`. The check and the write happen under the writer lock.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn put_unclaimed(&self, prefix: &str, name: &str, data: &[u8]) -> Result<Claim, RgetError> {
        validate_name(name)?;
        let mut log = self.log.lock().map_err(|_| poisoned("writer"))?;
        if let Some(existing) = self.prefix_search(prefix)?.into_iter().next() {
            return Ok(Claim::Existing(existing));
        }
        let id = log.append(name, data)?;
        self.snapshot
            .write()
            .map_err(|_| poisoned("snapshot"))?
            .insert(name.to_string(), data.to_vec());
        Ok(Claim::Stored(id))
    }

    /// Remove `name`; returns once the commit is pushed.
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> Result<CommitId, RgetError> {
        validate_name(name)?;
        let mut log = self.log.lock().map_err(|_| poisoned("writer"))?;
        if !self.contains(name)? {
            return Err(RgetError::NotFound { name: name.into() });
        }
        let id = log.remove(name)?;
        self.snapshot
            .write()
            .map_err(|_| poisoned("snapshot"))?
            .remove(name);
        Ok(id)
    }

    /// Run `f` with exclusive access to the audit log.
    pub fn with_log<T>(&self, f: impl FnOnce(&L) -> T) -> Result<T, RgetError> {
        let log = self.log.lock().map_err(|_| poisoned("writer"))?;
        Ok(f(&log))
    }
}
