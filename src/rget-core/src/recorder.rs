//! Accepting sum files into the record cache.
//!
//! A record is stored under `<domain>[.<site suffix>]`, where `<domain>` is
//! the two-label Merkle name of the submitted list. Once stored, the
//! record's hostname can be certified by the host policy and the
//! certificate's SCTs become the public proof of the release.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::RgetError;
use crate::store::{AuditLog, Claim, CommitId, ContentAddressableCache};
use crate::sums::{fetch_bytes, UrlSumList};
use crate::wellknown;

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Record name.
    pub name: String,
    /// The record already existed and nothing was written.
    pub cache_hit: bool,
    /// Audit commit, if one was made.
    #[serde(skip)]
    pub commit: Option<CommitId>,
}

/// Writes submitted sum files into a [`ContentAddressableCache`].
pub struct Recorder<L: AuditLog> {
    cache: Arc<ContentAddressableCache<L>>,
    timeout: Duration,
}

impl<L: AuditLog + 'static> Recorder<L> {
    /// Create a recorder. `timeout` bounds each download.
    pub fn new(cache: Arc<ContentAddressableCache<L>>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<ContentAddressableCache<L>> {
        &self.cache
    }

    /// Record a sum file, optionally qualified by a site `suffix`.
    pub fn submit(&self, sum_file: &[u8], suffix: Option<&str>) -> Result<Submission, RgetError> {
        record(&self.cache, sum_file, suffix)
    }

    /// Download the sum file at `url` and record it under the URL's site
    /// domain.
    #[instrument(skip(self))]
    pub async fn submit_url(&self, url: &str) -> Result<Submission, RgetError> {
        let suffix = wellknown::domain(url)?;
        let body = fetch_bytes(url, self.timeout).await?;

        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || record(&cache, &body, Some(&suffix)))
            .await
            .map_err(|e| RgetError::CacheUnavailable {
                message: format!("record task failed: {e}"),
            })?
    }
}

fn record<L: AuditLog>(
    cache: &ContentAddressableCache<L>,
    sum_file: &[u8],
    suffix: Option<&str>,
) -> Result<Submission, RgetError> {
    let text = std::str::from_utf8(sum_file)
        .map_err(|e| RgetError::parse(format!("sum file is not UTF-8: {e}")))?;
    let sums = UrlSumList::from_sum_file(text);
    if sums.is_empty() {
        return Err(RgetError::parse("sum file has no entries"));
    }

    let name = match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{}.{suffix}", sums.domain()),
        None => sums.domain(),
    };

    // At most one record per Merkle root, whatever the site suffix.
    match cache.put_unclaimed(&sums.domain(), &name, sum_file)? {
        Claim::Existing(existing) => {
            info!(name = %existing, requested = %name, "Record already present");
            Ok(Submission {
                name: existing,
                cache_hit: true,
                commit: None,
            })
        }
        Claim::Stored(commit) => {
            info!(name = %name, commit = %commit, entries = sums.len(), "Recorded sum file");
            Ok(Submission {
                name,
                cache_hit: false,
                commit: Some(commit),
            })
        }
    }
}
