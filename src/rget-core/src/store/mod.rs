//! Audited key/value storage for records.
//!
//! Every accepted mutation becomes exactly one commit in an append-only
//! audit log, pushed before the call returns:
//!
//! ```text
//! put(name, data)  ──►  commit "put: <name>"     ──►  push  ──►  snapshot updated
//! delete(name)     ──►  commit "delete: <name>"  ──►  push  ──►  snapshot updated
//!                             │ failure
//!                             ▼
//!                        roll back, error
//! ```
//!
//! [`AuditLog`] is the versioned backend ([`GitAuditLog`] in production,
//! [`MemoryAuditLog`] for tests); [`ContentAddressableCache`] owns
//! serialization and the read snapshot.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::RgetError;

mod cache;
mod git;
mod memory;

pub use cache::{Claim, ContentAddressableCache};
pub use git::{GitAuditLog, GitAuditOptions};
pub use memory::MemoryAuditLog;

/// Identifier of an audit commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(pub String);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Versioned storage that records every mutation as one commit.
///
/// `append` and `remove` must either commit and publish the change or
/// leave no trace of it.
pub trait AuditLog: Send + Sync {
    /// Write `name` and record `put: <name>`.
    fn append(&mut self, name: &str, data: &[u8]) -> Result<CommitId, RgetError>;

    /// Remove `name` and record `delete: <name>`.
    fn remove(&mut self, name: &str) -> Result<CommitId, RgetError>;

    /// Contents of `name`.
    fn read(&self, name: &str) -> Result<Vec<u8>, RgetError>;

    /// Sorted names starting with `prefix`.
    fn prefix_scan(&self, prefix: &str) -> Result<Vec<String>, RgetError>;

    /// Every committed entry.
    fn entries(&self) -> Result<BTreeMap<String, Vec<u8>>, RgetError>;
}

/// Commit message for a mutation.
pub(crate) fn commit_message(verb: &str, name: &str) -> String {
    format!("{verb}: {name}")
}

/// Reject names that are not a single plain path component.
pub fn validate_name(name: &str) -> Result<(), RgetError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(RgetError::InvalidName { name: name.into() })
    } else {
        Ok(())
    }
}
