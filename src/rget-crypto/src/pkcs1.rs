//! RSASSA-PKCS1-v1_5 with SHA-256.
//!
//! RFC 6962 lets a log sign with RSA instead of ECDSA. Keys arrive as DER
//! SubjectPublicKeyInfo like the P-256 ones; signatures are the raw
//! modulus-sized PKCS#1 v1.5 block.

use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::types::SignatureScheme;
use crate::verifier::{SignatureVerifier, Signer};

/// Smallest modulus accepted for verification, in bits.
pub const MIN_RSA_BITS: usize = 2048;

/// RSA PKCS#1 v1.5 SHA-256 signer, for local logs and test fixtures.
pub struct RsaSigner {
    signing_key: SigningKey<Sha256>,
}

impl RsaSigner {
    /// Create a signer from a PKCS#8 DER private key.
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be decoded.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;
        Ok(Self {
            signing_key: SigningKey::new(key),
        })
    }
}

impl Signer for RsaSigner {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::RSA_SHA256
    }

    fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let public = RsaPublicKey::from(self.signing_key.as_ref());
        let doc = public
            .to_public_key_der()
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature = self
            .signing_key
            .try_sign(data)
            .map_err(|e| CryptoError::signing_failed(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

/// RSA PKCS#1 v1.5 SHA-256 verifier.
#[derive(Debug, Default)]
pub struct RsaVerifier;

impl RsaVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for RsaVerifier {
    fn verify(
        &self,
        public_key_der: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let key = RsaPublicKey::from_public_key_der(public_key_der)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
        let bits = key.n().bits();
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::invalid_public_key(format!(
                "{bits}-bit RSA modulus is below {MIN_RSA_BITS}"
            )));
        }
        if signature.len() != key.size() {
            return Err(CryptoError::invalid_signature(format!(
                "{} bytes for a {}-byte modulus",
                signature.len(),
                key.size()
            )));
        }

        let sig = Signature::try_from(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        match VerifyingKey::<Sha256>::new(key).verify(data, &sig) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
