//! # rget-core
//!
//! Binary transparency for release downloads, anchored in public
//! Certificate Transparency logs.
//!
//! A release's `SHA256SUMS` is hashed into an RFC 6962 Merkle tree and the
//! root becomes a DNS label. The recorder stores the list under that label
//! and obtains a TLS certificate for the hostname, which lands the label in
//! CT logs. A downloader recomputes the label from the sums it fetched and
//! checks that a logged certificate vouches for it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────── recorder ────────────────────────────────┐
//! │                                                                           │
//! │  SHA256SUMS ──► UrlSumList ──► MerkleAccumulator ──► <short>.<long>.<site>│
//! │                                                            │              │
//! │                                                            ▼              │
//! │                                             ContentAddressableCache       │
//! │                                             (git audit log, push-or-undo) │
//! │                                                            │              │
//! │  ACME SNI host ──► DynamicCertPolicy ──────────────────────┘              │
//! │                    (exactly one record, root recomputed)                  │
//! └───────────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────── downloader ──────────────────────────────┐
//! │                                                                           │
//! │  fetch SHA256SUMS ──► label ──► TLS chain of https://<label>.<root>       │
//! │                                        │                                  │
//! │                                        ▼                                  │
//! │                                   SctVerifier                             │
//! │                    (log signature, STH, inclusion proof, MMD)             │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Fail-closed policy**: any lookup or parse failure denies issuance
//! - **Audited storage**: a mutation is visible only after it is committed
//!   and pushed
//! - **Honest verdicts**: an SCT is valid only when signed by a trusted log
//!   and proven included; young SCTs are reported as pending, not valid
//! - **One record per root**: a resubmitted sum list, under any site, is a
//!   cache hit on the existing record
//!
//! Submissions arrive over HTTP via [`server::router`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod config;
pub mod ct;
pub mod error;
pub mod merkle;
pub mod policy;
pub mod recorder;
pub mod server;
pub mod store;
pub mod sums;
pub mod wellknown;

pub use config::RgetConfig;
pub use ct::{HttpLogClient, LogClient, LogDirectory, SctVerifier, VerificationSummary};
pub use error::RgetError;
pub use merkle::{verify_inclusion, Hash, MerkleAccumulator};
pub use policy::{CertPolicy, DynamicCertPolicy, HostPolicy, RecordLookup};
pub use recorder::{Recorder, Submission};
pub use store::{AuditLog, ContentAddressableCache, GitAuditLog, GitAuditOptions, MemoryAuditLog};
pub use sums::{UrlSum, UrlSumList};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git revision the crate was built from.
pub const BUILD_REVISION: &str = env!("RGET_BUILD_REVISION");
