//! Configuration for recording and verification.

use std::path::PathBuf;
use std::time::Duration;

use crate::wellknown::PUBLIC_SERVICE_HOST;

/// Google's v3 CT log list.
pub const DEFAULT_LOG_LIST_URL: &str = "https://www.gstatic.com/ct/log_list/v3/log_list.json";

/// Configuration for rget.
///
/// Built once at startup and passed explicitly; nothing in the library reads
/// process-global state.
#[derive(Debug, Clone)]
pub struct RgetConfig {
    /// Domain under which record labels are certified.
    pub service_root: String,
    /// Trusted CT log list (URL or local path).
    pub log_list: String,
    /// Timeout for each network call (log queries, TLS dials, downloads).
    pub timeout: Duration,
    /// Working tree of the audit repository.
    pub cache_dir: PathBuf,
    /// Remote the audit repository is cloned from and pushed to.
    pub git_remote: Option<String>,
    /// Author name on audit commits.
    pub author_name: String,
    /// Author email on audit commits.
    pub author_email: String,
}

impl Default for RgetConfig {
    fn default() -> Self {
        Self {
            service_root: PUBLIC_SERVICE_HOST.into(),
            log_list: DEFAULT_LOG_LIST_URL.into(),
            timeout: Duration::from_secs(30),
            cache_dir: PathBuf::from("public"),
            git_remote: None,
            author_name: "Merkle County Recorder".into(),
            author_email: "security@merklecounty.com".into(),
        }
    }
}
