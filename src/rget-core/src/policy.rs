//! Certificate issuance policy for record hostnames.
//!
//! An ACME client asks, for each TLS SNI hostname, which names a
//! certificate may carry. A hostname is approved only when it resolves to
//! exactly one stored record whose recomputed Merkle root matches the
//! hostname's leading label. Every other outcome is a denial; there is no
//! fallback name set.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::RgetError;
use crate::store::{AuditLog, ContentAddressableCache};
use crate::sums::UrlSumList;
use crate::wellknown::is_digest_label;

/// Names a certificate may be issued for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertPolicy {
    /// Subject common name.
    pub common_name: String,
    /// Subject alternative DNS names.
    pub dns_names: Vec<String>,
}

impl CertPolicy {
    /// Whether `host` is the common name or one of the DNS names.
    #[must_use]
    pub fn certifies(&self, host: &str) -> bool {
        self.common_name == host || self.dns_names.iter().any(|n| n == host)
    }
}

/// Decides issuance for a hostname.
pub trait HostPolicy: Send + Sync {
    /// Policy for `host`, or an error if issuance must be refused.
    fn policy_for(&self, host: &str) -> Result<CertPolicy, RgetError>;
}

/// Read access to stored records.
pub trait RecordLookup: Send + Sync {
    /// Sorted record names starting with `prefix`.
    fn prefix_search(&self, prefix: &str) -> Result<Vec<String>, RgetError>;

    /// Contents of record `name`.
    fn get(&self, name: &str) -> Result<Vec<u8>, RgetError>;
}

impl<L: AuditLog> RecordLookup for ContentAddressableCache<L> {
    fn prefix_search(&self, prefix: &str) -> Result<Vec<String>, RgetError> {
        ContentAddressableCache::prefix_search(self, prefix)
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, RgetError> {
        ContentAddressableCache::get(self, name)
    }
}

/// [`HostPolicy`] backed by the record cache.
pub struct DynamicCertPolicy<S: RecordLookup> {
    records: Arc<S>,
    root: String,
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

impl<S: RecordLookup> DynamicCertPolicy<S> {
    /// Policy for record hostnames under `root`.
    pub fn new(records: Arc<S>, root: &str) -> Self {
        Self {
            records,
            root: normalize_host(root),
        }
    }

    fn decide(&self, host: &str) -> Result<CertPolicy, RgetError> {
        let root = &self.root;
        if host == root {
            return Ok(CertPolicy {
                common_name: root.clone(),
                dns_names: Vec::new(),
            });
        }

        let sub = host
            .strip_suffix(root.as_str())
            .and_then(|h| h.strip_suffix('.'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RgetError::denied(host, format!("not in managed domain {root}")))?;

        let key = sub.split('.').next().unwrap_or_default();
        if !is_digest_label(key) {
            return Err(RgetError::denied(host, "leading label is not a record digest"));
        }

        let matches = self.records.prefix_search(key)?;
        let name = match matches.as_slice() {
            [name] => name,
            [] => return Err(RgetError::denied(host, "unknown merkle prefix")),
            _ => {
                return Err(RgetError::denied(
                    host,
                    format!("ambiguous merkle prefix ({} records)", matches.len()),
                ))
            }
        };

        let content = self.records.get(name)?;
        let sums = UrlSumList::from_sum_file(&String::from_utf8_lossy(&content));
        let short = sums.short_domain();
        if short != key {
            warn!(host = %host, record = %name, computed = %short, "Record does not hash to its label");
            return Err(RgetError::denied(host, "record mismatch"));
        }

        let mut dns_names = vec![format!("{name}.{root}")];
        let full = format!("{}.{root}", sums.domain());
        if !dns_names.contains(&full) {
            dns_names.push(full);
        }
        let policy = CertPolicy {
            common_name: format!("{short}.{root}"),
            dns_names,
        };

        if !policy.certifies(host) {
            return Err(RgetError::denied(host, "hostname is not a name of its record"));
        }
        Ok(policy)
    }
}

impl<S: RecordLookup> HostPolicy for DynamicCertPolicy<S> {
    fn policy_for(&self, host: &str) -> Result<CertPolicy, RgetError> {
        let host = normalize_host(host);
        match self.decide(&host) {
            Ok(policy) => {
                info!(host = %host, common_name = %policy.common_name, sans = policy.dns_names.len(), "Issuance approved");
                Ok(policy)
            }
            Err(e) => {
                debug!(host = %host, error = %e, "Issuance refused");
                Err(e)
            }
        }
    }
}
