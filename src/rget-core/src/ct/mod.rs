//! Certificate Transparency verification.
//!
//! - [`sct`]: SCT and SCT-list wire formats
//! - [`leaf`]: log entries, signature inputs and leaf hashes
//! - [`loglist`]: the trusted log directory
//! - [`client`]: `get-sth` / `get-proof-by-hash`
//! - [`verifier`]: per-SCT signature and inclusion checks
//! - [`site`]: fetching a site's chain over TLS

mod codec;

pub mod client;
pub mod leaf;
pub mod loglist;
pub mod sct;
pub mod site;
pub mod verifier;

pub use client::{HttpLogClient, InclusionProof, LogClient, SignedTreeHead};
pub use leaf::{ca_issuer_urls, embedded_scts, LogEntry, MerkleTreeLeaf};
pub use loglist::{LogDirectory, LogInfo};
pub use sct::{encode_sct_list, parse_sct_list, DigitallySigned, SignedCertificateTimestamp, SCT_LIST_OID};
pub use site::{certificate_covers_host, fetch_site_chain, SiteChain};
pub use verifier::{
    verify_sct_signature, CheckOutcome, InclusionOutcome, SctReport, SctSource, SctVerifier,
    Verdict, VerificationSummary,
};
