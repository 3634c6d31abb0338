//! Error types for recording and verification operations.

use thiserror::Error;

/// Errors that can occur in rget.
#[derive(Debug, Error)]
pub enum RgetError {
    /// Malformed input (sum file line, SCT bytes, certificate, log list).
    #[error("Parse error: {message}")]
    Parse {
        /// Error message.
        message: String,
    },

    /// An SCT names a log that is not in the trusted directory.
    #[error("Unknown log: {log_id}")]
    UnknownLog {
        /// Hex log ID.
        log_id: String,
    },

    /// An SCT or tree head signature did not verify.
    #[error("Signature verification failed: {reason}")]
    SignatureInvalid {
        /// Reason for failure.
        reason: String,
    },

    /// Inclusion could not be proven and the log's merge delay has passed.
    #[error("Inclusion unproven: {reason}")]
    InclusionUnproven {
        /// Reason for failure.
        reason: String,
    },

    /// Inclusion could not be proven yet, but the SCT is younger than the
    /// log's maximum merge delay.
    #[error("Inclusion pending: {reason}")]
    InclusionPending {
        /// Reason for failure.
        reason: String,
    },

    /// Cache entry not found.
    #[error("Not found: {name}")]
    NotFound {
        /// Entry name.
        name: String,
    },

    /// Entry name rejected (path separators, hidden names, empty).
    #[error("Invalid entry name: {name}")]
    InvalidName {
        /// Entry name.
        name: String,
    },

    /// Commit or push to the audit log failed; the mutation was rolled back.
    #[error("Cache unavailable: {message}")]
    CacheUnavailable {
        /// Error message.
        message: String,
    },

    /// The audit store could not be rolled back after a failed push and may
    /// have diverged from the remote.
    #[error("Cache diverged from remote: {message}")]
    CacheDiverged {
        /// Error message.
        message: String,
    },

    /// Host policy refused to authorize a certificate.
    #[error("Policy denied for {host}: {reason}")]
    PolicyDenied {
        /// Requested hostname.
        host: String,
        /// Reason for denial.
        reason: String,
    },

    /// No domain mapping exists for a URL.
    #[error("No domain translation logic for URL: {url}")]
    UnknownSite {
        /// The URL.
        url: String,
    },

    /// HTTP error talking to a log or fetching a sum file.
    #[error("HTTP error: {message}")]
    Http {
        /// Error message.
        message: String,
    },

    /// TLS connection error.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// A network call exceeded its deadline.
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Deadline in seconds.
        seconds: u64,
    },

    /// Local I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] rget_crypto::CryptoError),
}

impl RgetError {
    /// Create a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an HTTP error.
    #[must_use]
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a policy denial.
    #[must_use]
    pub fn denied(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyDenied {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error must abort the request that triggered it.
    ///
    /// Storage and policy failures propagate; per-SCT and parse failures are
    /// aggregated by the caller instead.
    #[must_use]
    pub fn is_fatal_to_request(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable { .. }
                | Self::CacheDiverged { .. }
                | Self::PolicyDenied { .. }
                | Self::InvalidName { .. }
        )
    }

    /// Check if the same operation may succeed later without any change on
    /// our side (a log that has not merged an entry yet).
    #[must_use]
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, Self::InclusionPending { .. })
    }
}

impl From<std::io::Error> for RgetError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}
