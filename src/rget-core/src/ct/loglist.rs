//! Trusted CT log directory.
//!
//! Loaded once per process from a JSON log list (Google's v3
//! `operators[].logs[]` shape or the legacy v1 `logs[]` shape) and shared
//! read-only behind an `Arc`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::error::RgetError;
use crate::sums::fetch_bytes;

/// One trusted log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInfo {
    /// SHA-256 of `key`.
    pub log_id: [u8; 32],
    /// DER SubjectPublicKeyInfo.
    pub key: Vec<u8>,
    /// Maximum merge delay.
    pub mmd: Duration,
    /// Human-readable name.
    pub description: String,
    /// API base URL, with scheme and trailing slash.
    pub url: String,
}

impl LogInfo {
    /// Build from a DER key; the log ID is derived from it.
    pub fn new(description: impl Into<String>, key: Vec<u8>, url: &str, mmd: Duration) -> Self {
        Self {
            log_id: Sha256::digest(&key).into(),
            key,
            mmd,
            description: description.into(),
            url: normalize_url(url),
        }
    }
}

/// Immutable map from log ID to [`LogInfo`].
#[derive(Debug, Clone, Default)]
pub struct LogDirectory {
    logs: HashMap<[u8; 32], LogInfo>,
}

#[derive(Deserialize)]
struct LogListJson {
    #[serde(default)]
    operators: Vec<OperatorJson>,
    #[serde(default)]
    logs: Vec<LogJson>,
}

#[derive(Deserialize)]
struct OperatorJson {
    #[serde(default)]
    logs: Vec<LogJson>,
}

#[derive(Deserialize)]
struct LogJson {
    #[serde(default)]
    description: String,
    #[serde(default)]
    log_id: Option<String>,
    key: String,
    url: String,
    #[serde(default, alias = "maximum_merge_delay")]
    mmd: u64,
}

impl LogDirectory {
    /// Build from known logs.
    pub fn new(logs: impl IntoIterator<Item = LogInfo>) -> Self {
        Self {
            logs: logs.into_iter().map(|l| (l.log_id, l)).collect(),
        }
    }

    /// Parse a JSON log list.
    ///
    /// Entries with undecodable keys, or whose stated log ID does not
    /// match their key, are skipped with a warning.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RgetError> {
        let list: LogListJson = serde_json::from_slice(bytes)
            .map_err(|e| RgetError::parse(format!("log list: {e}")))?;

        let mut logs = Vec::new();
        let entries = list
            .operators
            .into_iter()
            .flat_map(|op| op.logs)
            .chain(list.logs);
        for entry in entries {
            let Ok(key) = BASE64.decode(entry.key.as_bytes()) else {
                warn!(log = %entry.description, "Skipping log with undecodable key");
                continue;
            };
            let info = LogInfo::new(entry.description, key, &entry.url, Duration::from_secs(entry.mmd));
            if let Some(stated) = entry.log_id {
                if BASE64.decode(stated.as_bytes()).ok().as_deref() != Some(&info.log_id[..]) {
                    warn!(log = %info.description, "Skipping log whose log_id does not match its key");
                    continue;
                }
            }
            logs.push(info);
        }

        if logs.is_empty() {
            return Err(RgetError::parse("log list contains no usable logs"));
        }
        Ok(Self::new(logs))
    }

    /// Load from an `http(s)://` URL or a local path.
    #[instrument]
    pub async fn load(location: &str, timeout: Duration) -> Result<Self, RgetError> {
        let bytes = if location.starts_with("https://") || location.starts_with("http://") {
            fetch_bytes(location, timeout).await?
        } else {
            debug!("Reading log list from {}", location);
            std::fs::read(Path::new(location))?
        };
        let dir = Self::from_json(&bytes)?;
        info!(logs = dir.len(), "Loaded CT log list");
        Ok(dir)
    }

    /// Look up a log by ID.
    #[must_use]
    pub fn get(&self, log_id: &[u8; 32]) -> Option<&LogInfo> {
        self.logs.get(log_id)
    }

    /// Number of logs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// All logs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &LogInfo> {
        self.logs.values()
    }
}

// v1 lists omit the scheme.
fn normalize_url(url: &str) -> String {
    let mut url = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}
