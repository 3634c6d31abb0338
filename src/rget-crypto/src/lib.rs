//! # rget-crypto
//!
//! Signature primitives for Certificate Transparency verification.
//!
//! CT logs sign two kinds of statements with the same key: Signed Certificate
//! Timestamps and Signed Tree Heads. Both arrive as TLS `DigitallySigned`
//! structs, so this crate exposes:
//!
//! - **Algorithm identifiers**: the RFC 5246 hash/signature byte codes
//! - **Verification**: ECDSA P-256 and RSA PKCS#1 v1.5, both over SHA-256,
//!   with DER SubjectPublicKeyInfo keys
//! - **Signing**: for locally operated logs and test fixtures
//!
//! ```text
//! DigitallySigned {
//!     hash_algorithm      (1 byte)
//!     signature_algorithm (1 byte)
//!     signature           opaque<0..2^16-1>
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod ecdsa;
mod error;
mod pkcs1;
mod types;
mod verifier;

pub use ecdsa::{P256Signer, P256Verifier};
pub use error::CryptoError;
pub use pkcs1::{RsaSigner, RsaVerifier, MIN_RSA_BITS};
pub use types::{HashAlgorithm, SignatureAlgorithm, SignatureScheme};
pub use verifier::{verify_digitally_signed, SignatureVerifier, Signer};

/// Constant-time byte comparison.
///
/// Compares two byte slices in constant time. Returns `true` if the slices
/// are equal, `false` otherwise.
///
/// Use this for every comparison of hashes that gate a trust decision
/// (Merkle roots, log IDs, key hashes).
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        // Lengths are public (fixed-size hashes).
        return false;
    }
    a.ct_eq(b).into()
}
