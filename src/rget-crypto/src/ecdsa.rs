//! ECDSA P-256 signature operations.
//!
//! CT logs publish their keys as DER SubjectPublicKeyInfo and sign with
//! DER-encoded ECDSA signatures over SHA-256, so both directions here speak
//! DER rather than raw SEC1 points and fixed-size signatures.

use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand_core::OsRng;

use crate::error::CryptoError;
use crate::types::SignatureScheme;
use crate::verifier::{Signer, SignatureVerifier};

/// ECDSA P-256 signer.
///
/// Logs sign with keys we never see; this exists so tree heads and SCTs can
/// be produced for local logs and test fixtures.
pub struct P256Signer {
    signing_key: SigningKey,
}

impl P256Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Create a signer from a 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns error if the key bytes are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// Get the verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl Signer for P256Signer {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::ECDSA_SHA256
    }

    fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = self
            .signing_key
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| CryptoError::signing_failed(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// ECDSA P-256 verifier.
pub struct P256Verifier;

impl P256Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for P256Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for P256Verifier {
    fn verify(
        &self,
        public_key_der: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let vk = VerifyingKey::from_public_key_der(public_key_der)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

        let sig = Signature::from_der(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        match vk.verify(data, &sig) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
