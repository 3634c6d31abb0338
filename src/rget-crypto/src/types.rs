//! TLS signature algorithm identifiers (RFC 5246 §7.4.1.4.1).
//!
//! CT logs sign SCTs and tree heads as TLS `DigitallySigned` structs, which
//! carry a one-byte hash identifier and a one-byte signature identifier
//! ahead of the signature bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hash algorithm of a `DigitallySigned` struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HashAlgorithm {
    /// No hash.
    None = 0,
    /// MD5 (never accepted).
    Md5 = 1,
    /// SHA-1 (never accepted).
    Sha1 = 2,
    /// SHA-224.
    Sha224 = 3,
    /// SHA-256, the only hash RFC 6962 logs use.
    Sha256 = 4,
    /// SHA-384.
    Sha384 = 5,
    /// SHA-512.
    Sha512 = 6,
}

impl TryFrom<u8> for HashAlgorithm {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::None,
            1 => Self::Md5,
            2 => Self::Sha1,
            3 => Self::Sha224,
            4 => Self::Sha256,
            5 => Self::Sha384,
            6 => Self::Sha512,
            other => return Err(other),
        })
    }
}

/// Signature algorithm of a `DigitallySigned` struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    /// Anonymous (never accepted).
    Anonymous = 0,
    /// RSASSA-PKCS1-v1_5.
    Rsa = 1,
    /// DSA.
    Dsa = 2,
    /// ECDSA.
    Ecdsa = 3,
}

impl TryFrom<u8> for SignatureAlgorithm {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Anonymous,
            1 => Self::Rsa,
            2 => Self::Dsa,
            3 => Self::Ecdsa,
            other => return Err(other),
        })
    }
}

/// A (hash, signature) algorithm pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureScheme {
    /// Hash algorithm.
    pub hash: HashAlgorithm,
    /// Signature algorithm.
    pub signature: SignatureAlgorithm,
}

impl SignatureScheme {
    /// ECDSA over P-256 with SHA-256.
    pub const ECDSA_SHA256: Self = Self {
        hash: HashAlgorithm::Sha256,
        signature: SignatureAlgorithm::Ecdsa,
    };

    /// RSASSA-PKCS1-v1_5 with SHA-256.
    pub const RSA_SHA256: Self = Self {
        hash: HashAlgorithm::Sha256,
        signature: SignatureAlgorithm::Rsa,
    };
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-{:?}", self.signature, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_algorithm_codes() {
        assert_eq!(HashAlgorithm::try_from(4), Ok(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::try_from(7), Err(7));
    }

    #[test]
    fn test_signature_algorithm_codes() {
        assert_eq!(SignatureAlgorithm::try_from(3), Ok(SignatureAlgorithm::Ecdsa));
        assert_eq!(SignatureAlgorithm::try_from(1), Ok(SignatureAlgorithm::Rsa));
        assert_eq!(SignatureAlgorithm::try_from(9), Err(9));
    }

    #[test]
    fn test_scheme_display() {
        assert_eq!(SignatureScheme::ECDSA_SHA256.to_string(), "Ecdsa-Sha256");
    }
}
