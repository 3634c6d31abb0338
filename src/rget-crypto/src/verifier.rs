//! Signature traits and `DigitallySigned` dispatch.

use crate::ecdsa::P256Verifier;
use crate::error::CryptoError;
use crate::pkcs1::RsaVerifier;
use crate::types::SignatureScheme;

/// Trait for signature operations.
pub trait Signer {
    /// Get the scheme used by this signer.
    fn scheme(&self) -> SignatureScheme;

    /// Get the public key as DER SubjectPublicKeyInfo.
    fn public_key_der(&self) -> Result<Vec<u8>, CryptoError>;

    /// Sign data and return the encoded signature.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Trait for signature verification.
pub trait SignatureVerifier {
    /// Verify a signature against a DER SubjectPublicKeyInfo.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify,
    /// and an error when the key or signature cannot be decoded.
    fn verify(&self, public_key_der: &[u8], data: &[u8], signature: &[u8])
        -> Result<bool, CryptoError>;
}

/// Verify a `DigitallySigned` signature with the verifier for its scheme.
///
/// ECDSA P-256 and RSA PKCS#1 v1.5 are accepted, both only with SHA-256;
/// anything else is [`CryptoError::UnsupportedAlgorithm`].
pub fn verify_digitally_signed(
    scheme: SignatureScheme,
    public_key_der: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    match scheme {
        SignatureScheme::ECDSA_SHA256 => P256Verifier::new().verify(public_key_der, data, signature),
        SignatureScheme::RSA_SHA256 => RsaVerifier::new().verify(public_key_der, data, signature),
        other => Err(CryptoError::unsupported(other.to_string())),
    }
}
