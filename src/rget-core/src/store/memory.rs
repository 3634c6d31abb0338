//! In-memory [`AuditLog`].

use std::collections::BTreeMap;

use super::{commit_message, validate_name, AuditLog, CommitId};
use crate::error::RgetError;

/// Audit log held in memory; commits are recorded as messages.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: BTreeMap<String, Vec<u8>>,
    commits: Vec<String>,
    fail_next: bool,
}

impl MemoryAuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit messages, oldest first.
    #[must_use]
    pub fn commits(&self) -> &[String] {
        &self.commits
    }

    /// Make the next mutation fail as an unreachable remote would.
    pub fn fail_next_commit(&mut self) {
        self.fail_next = true;
    }

    fn record(&mut self, verb: &str, name: &str) -> Result<CommitId, RgetError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(RgetError::CacheUnavailable {
                message: "push rejected".into(),
            });
        }
        self.commits.push(commit_message(verb, name));
        Ok(CommitId(self.commits.len().to_string()))
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&mut self, name: &str, data: &[u8]) -> Result<CommitId, RgetError> {
        validate_name(name)?;
        let id = self.record("put", name)?;
        self.entries.insert(name.to_string(), data.to_vec());
        Ok(id)
    }

    fn remove(&mut self, name: &str) -> Result<CommitId, RgetError> {
        validate_name(name)?;
        if !self.entries.contains_key(name) {
            return Err(RgetError::NotFound { name: name.into() });
        }
        let id = self.record("delete", name)?;
        self.entries.remove(name);
        Ok(id)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, RgetError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| RgetError::NotFound { name: name.into() })
    }

    fn prefix_scan(&self, prefix: &str) -> Result<Vec<String>, RgetError> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn entries(&self) -> Result<BTreeMap<String, Vec<u8>>, RgetError> {
        Ok(self.entries.clone())
    }
}
