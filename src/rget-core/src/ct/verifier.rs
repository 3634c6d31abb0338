//! SCT verification against a trusted log directory.
//!
//! Each SCT is checked twice: its signature against the log key, then its
//! inclusion in the log's tree via an online audit-path query. An SCT is
//! only valid when both hold.
//!
//! Inclusion that cannot be proven while the SCT is younger than the log's
//! maximum merge delay is *pending*: the log may simply not have merged the
//! entry yet. Pending is reported separately and never counted as valid.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::client::LogClient;
use super::leaf::{ca_issuer_urls, embedded_scts, MerkleTreeLeaf};
use super::loglist::{LogDirectory, LogInfo};
use super::sct::SignedCertificateTimestamp;
use crate::error::RgetError;
use crate::merkle::verify_inclusion;
use crate::sums::fetch_bytes;

/// Where an SCT came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SctSource {
    /// SCT-list extension of the leaf certificate.
    Embedded,
    /// TLS `signed_certificate_timestamp` extension.
    Tls,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Check passed.
    Passed,
    /// Check failed.
    Failed(String),
    /// Check could not run (malformed SCT, unknown log).
    Skipped,
}

/// Result of the inclusion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InclusionOutcome {
    /// Audit path verified against a signed tree head.
    Proven {
        /// Leaf index in the log.
        leaf_index: u64,
        /// Size of the tree the proof was checked against.
        tree_size: u64,
    },
    /// Not proven, but the SCT is younger than the log's MMD.
    Pending {
        /// Why the proof failed.
        reason: String,
    },
    /// Not proven and the MMD has passed.
    Unproven {
        /// Why the proof failed.
        reason: String,
    },
    /// Check could not run.
    Skipped,
}

/// Final classification of one SCT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// Signature valid and inclusion proven.
    Valid,
    /// Signature valid, inclusion not yet provable.
    Pending(String),
    /// Anything else.
    Invalid(String),
}

/// Everything learned about one SCT.
#[derive(Debug, Clone, Serialize)]
pub struct SctReport {
    /// `embedded SCT[0]`, `TLS SCT[1]`, ...
    pub subject: String,
    /// Origin of the SCT.
    pub source: SctSource,
    /// Description of the issuing log, when known.
    pub log: Option<String>,
    /// SCT timestamp (ms), when decodable.
    pub timestamp: Option<u64>,
    /// Signature check.
    pub signature: CheckOutcome,
    /// Inclusion check.
    pub inclusion: InclusionOutcome,
    /// Final classification.
    pub verdict: Verdict,
}

impl SctReport {
    fn rejected(subject: String, source: SctSource, reason: String) -> Self {
        Self {
            subject,
            source,
            log: None,
            timestamp: None,
            signature: CheckOutcome::Skipped,
            inclusion: InclusionOutcome::Skipped,
            verdict: Verdict::Invalid(reason),
        }
    }
}

/// All SCT reports for one certificate chain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationSummary {
    /// Per-SCT reports, TLS first then embedded.
    pub reports: Vec<SctReport>,
}

impl VerificationSummary {
    fn count(&self, f: impl Fn(&Verdict) -> bool) -> usize {
        self.reports.iter().filter(|r| f(&r.verdict)).count()
    }

    /// SCTs with a valid signature and proven inclusion.
    #[must_use]
    pub fn valid(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Valid))
    }

    /// SCTs that failed.
    #[must_use]
    pub fn invalid(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Invalid(_)))
    }

    /// SCTs whose inclusion may still be proven later.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Pending(_)))
    }

    /// Collapse to the caller-facing decision.
    ///
    /// Any invalid SCT is a hard failure. Otherwise pending SCTs are a
    /// retry-later failure, and a chain with no valid SCT at all is
    /// unproven.
    pub fn into_result(self) -> Result<Self, RgetError> {
        if self.invalid() > 0 {
            return Err(RgetError::InclusionUnproven {
                reason: format!("{} of {} SCTs invalid", self.invalid(), self.reports.len()),
            });
        }
        if self.pending() > 0 {
            return Err(RgetError::InclusionPending {
                reason: format!("{} of {} SCTs not yet merged", self.pending(), self.reports.len()),
            });
        }
        if self.valid() == 0 {
            return Err(RgetError::InclusionUnproven {
                reason: "certificate carries no SCTs".into(),
            });
        }
        Ok(self)
    }
}

impl fmt::Display for VerificationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} SCTs: {} valid, {} pending, {} invalid",
            self.reports.len(),
            self.valid(),
            self.pending(),
            self.invalid()
        )
    }
}

/// Checks SCTs against a [`LogDirectory`] using a [`LogClient`].
pub struct SctVerifier {
    logs: Arc<LogDirectory>,
    client: Arc<dyn LogClient>,
    timeout: Duration,
}

impl SctVerifier {
    /// Create a verifier. `timeout` bounds each inclusion check and each
    /// issuer download.
    pub fn new(logs: Arc<LogDirectory>, client: Arc<dyn LogClient>, timeout: Duration) -> Self {
        Self {
            logs,
            client,
            timeout,
        }
    }

    /// Check TLS-delivered and embedded SCTs for `chain` (DER, leaf first).
    #[instrument(skip_all, fields(chain_len = chain.len(), tls_scts = tls_scts.len()))]
    pub async fn verify_chain(&self, chain: &[Vec<u8>], tls_scts: &[Vec<u8>]) -> VerificationSummary {
        let mut reports = self.check_tls(chain, tls_scts).await;
        reports.extend(self.check_embedded(chain).await);

        let summary = VerificationSummary { reports };
        info!(
            valid = summary.valid(),
            pending = summary.pending(),
            invalid = summary.invalid(),
            "SCT verification complete"
        );
        summary
    }

    /// Check SCTs delivered on the TLS connection against the chain leaf.
    pub async fn check_tls(&self, chain: &[Vec<u8>], scts: &[Vec<u8>]) -> Vec<SctReport> {
        let subject = |i| format!("TLS SCT[{i}]");
        let Some(leaf_der) = chain.first() else {
            return scts
                .iter()
                .enumerate()
                .map(|(i, _)| SctReport::rejected(subject(i), SctSource::Tls, "empty chain".into()))
                .collect();
        };

        let leaf = MerkleTreeLeaf::x509(leaf_der);
        let mut reports = Vec::with_capacity(scts.len());
        for (i, sct) in scts.iter().enumerate() {
            reports.push(self.check_sct(subject(i), SctSource::Tls, &leaf, sct).await);
        }
        reports
    }

    /// Check SCTs embedded in the chain leaf.
    ///
    /// The issuer is taken from the chain, or fetched from the leaf's AIA
    /// `caIssuers` URL when the chain has none. Without an issuer every
    /// embedded SCT is invalid.
    pub async fn check_embedded(&self, chain: &[Vec<u8>]) -> Vec<SctReport> {
        let subject = |i| format!("embedded SCT[{i}]");
        let Some(leaf_der) = chain.first() else {
            return Vec::new();
        };
        let scts = match embedded_scts(leaf_der) {
            Ok(scts) => scts,
            Err(e) => {
                warn!(error = %e, "Failed to read embedded SCT list");
                return vec![SctReport::rejected(subject(0), SctSource::Embedded, e.to_string())];
            }
        };
        if scts.is_empty() {
            return Vec::new();
        }

        let issuer = match chain.get(1) {
            Some(issuer) => Ok(issuer.clone()),
            None => {
                info!("No issuer in chain; attempting online retrieval");
                self.fetch_issuer(leaf_der).await
            }
        };
        let leaf = issuer.and_then(|issuer| MerkleTreeLeaf::precert(leaf_der, &issuer));
        let leaf = match leaf {
            Ok(leaf) => leaf,
            Err(e) => {
                warn!(error = %e, "Failed to build precert leaf");
                return (0..scts.len())
                    .map(|i| SctReport::rejected(subject(i), SctSource::Embedded, e.to_string()))
                    .collect();
            }
        };

        let mut reports = Vec::with_capacity(scts.len());
        for (i, sct) in scts.iter().enumerate() {
            reports.push(self.check_sct(subject(i), SctSource::Embedded, &leaf, sct).await);
        }
        reports
    }

    /// Check one serialized SCT for `leaf`.
    #[instrument(skip(self, leaf, sct_bytes))]
    pub async fn check_sct(
        &self,
        subject: String,
        source: SctSource,
        leaf: &MerkleTreeLeaf,
        sct_bytes: &[u8],
    ) -> SctReport {
        let sct = match SignedCertificateTimestamp::from_bytes(sct_bytes) {
            Ok(sct) => sct,
            Err(e) => {
                warn!(subject = %subject, data = %hex::encode(sct_bytes), "Failed to deserialize SCT");
                return SctReport::rejected(subject, source, e.to_string());
            }
        };

        let Some(log) = self.logs.get(&sct.log_id) else {
            let e = RgetError::UnknownLog {
                log_id: hex::encode(sct.log_id),
            };
            warn!(subject = %subject, error = %e, "Cannot validate SCT");
            let mut report = SctReport::rejected(subject, source, e.to_string());
            report.timestamp = Some(sct.timestamp);
            return report;
        };

        let leaf = leaf.with_sct(&sct);
        let signature = match verify_sct_signature(log, &leaf, &sct) {
            Ok(()) => CheckOutcome::Passed,
            Err(e) => {
                warn!(subject = %subject, log = %log.description, error = %e, "SCT signature invalid");
                CheckOutcome::Failed(e.to_string())
            }
        };

        // Runs even after a bad signature so the report says whether the
        // log knows the entry.
        let inclusion = match tokio::time::timeout(self.timeout, self.prove_inclusion(log, &leaf, &sct)).await {
            Ok(Ok((leaf_index, tree_size))) => InclusionOutcome::Proven {
                leaf_index,
                tree_size,
            },
            Ok(Err(e)) => classify_unproven(log, &sct, e),
            Err(_) => classify_unproven(
                log,
                &sct,
                RgetError::Timeout {
                    operation: format!("inclusion check against {}", log.description),
                    seconds: self.timeout.as_secs(),
                },
            ),
        };

        let verdict = match (&signature, &inclusion) {
            (CheckOutcome::Failed(reason), _) => Verdict::Invalid(reason.clone()),
            (_, InclusionOutcome::Proven { .. }) => Verdict::Valid,
            (_, InclusionOutcome::Pending { reason }) => Verdict::Pending(reason.clone()),
            (_, InclusionOutcome::Unproven { reason }) => Verdict::Invalid(reason.clone()),
            (_, InclusionOutcome::Skipped) => Verdict::Invalid("inclusion not checked".into()),
        };
        debug!(subject = %subject, log = %log.description, ?verdict, "SCT checked");

        SctReport {
            subject,
            source,
            log: Some(log.description.clone()),
            timestamp: Some(sct.timestamp),
            signature,
            inclusion,
            verdict,
        }
    }

    async fn prove_inclusion(
        &self,
        log: &LogInfo,
        leaf: &MerkleTreeLeaf,
        sct: &SignedCertificateTimestamp,
    ) -> Result<(u64, u64), RgetError> {
        let sth = self.client.get_sth(log).await?;
        sth.verify(log)?;
        if sth.timestamp < sct.timestamp {
            return Err(RgetError::InclusionUnproven {
                reason: format!("tree head at {} predates SCT at {}", sth.timestamp, sct.timestamp),
            });
        }
        if sth.tree_size == 0 {
            return Err(RgetError::InclusionUnproven {
                reason: "log tree is empty".into(),
            });
        }

        let leaf_hash = leaf.leaf_hash()?;
        let proof = self
            .client
            .get_proof_by_hash(log, &leaf_hash, sth.tree_size)
            .await?;

        if verify_inclusion(
            proof.leaf_index,
            sth.tree_size,
            &leaf_hash,
            &proof.audit_path,
            &sth.root_hash,
        ) {
            Ok((proof.leaf_index, sth.tree_size))
        } else {
            Err(RgetError::InclusionUnproven {
                reason: format!(
                    "audit path for leaf {} does not match tree head of size {}",
                    proof.leaf_index, sth.tree_size
                ),
            })
        }
    }

    async fn fetch_issuer(&self, leaf_der: &[u8]) -> Result<Vec<u8>, RgetError> {
        let urls = ca_issuer_urls(leaf_der)?;
        let mut last = RgetError::parse("leaf has no caIssuers URL");
        for url in urls {
            match fetch_bytes(&url, self.timeout).await {
                Ok(der) => return Ok(der),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to get issuer online");
                    last = e;
                }
            }
        }
        Err(last)
    }
}

/// Verify `sct`'s signature over `leaf` (already patched with the SCT).
pub fn verify_sct_signature(
    log: &LogInfo,
    leaf: &MerkleTreeLeaf,
    sct: &SignedCertificateTimestamp,
) -> Result<(), RgetError> {
    let ok = rget_crypto::verify_digitally_signed(
        sct.signature.scheme,
        &log.key,
        &leaf.signature_input()?,
        &sct.signature.signature,
    )?;
    if ok {
        Ok(())
    } else {
        Err(RgetError::SignatureInvalid {
            reason: format!("SCT signature does not verify with {} key", log.description),
        })
    }
}

fn classify_unproven(log: &LogInfo, sct: &SignedCertificateTimestamp, e: RgetError) -> InclusionOutcome {
    let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let age = Duration::from_millis(now_ms.saturating_sub(sct.timestamp));
    if age < log.mmd {
        info!(
            log = %log.description,
            age_secs = age.as_secs(),
            mmd_secs = log.mmd.as_secs(),
            error = %e,
            "Inclusion unproven but SCT is younger than the log's MMD"
        );
        InclusionOutcome::Pending {
            reason: e.to_string(),
        }
    } else {
        warn!(log = %log.description, error = %e, "Failed to verify inclusion proof");
        InclusionOutcome::Unproven {
            reason: e.to_string(),
        }
    }
}
