//! CT log API client (RFC 6962 §4).
//!
//! Only the two calls inclusion checking needs: `get-sth` and
//! `get-proof-by-hash`. [`LogClient`] is the seam tests replace with an
//! in-memory log.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::leaf::SIGNATURE_TYPE_TREE_HASH;
use super::loglist::LogInfo;
use super::sct::DigitallySigned;
use crate::error::RgetError;
use crate::merkle::Hash;
use crate::sums::http_client;

/// A log's signed commitment to its tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTreeHead {
    /// Number of leaves.
    pub tree_size: u64,
    /// Milliseconds since epoch.
    pub timestamp: u64,
    /// Root hash of the tree.
    pub root_hash: Hash,
    /// Log signature over the tree head.
    pub signature: DigitallySigned,
}

impl SignedTreeHead {
    /// `TreeHeadSignature` bytes the log signs.
    #[must_use]
    pub fn signature_input(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(50);
        out.push(0);
        out.push(SIGNATURE_TYPE_TREE_HASH);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.tree_size.to_be_bytes());
        out.extend_from_slice(&self.root_hash);
        out
    }

    /// Check the tree head signature against `log`'s key.
    pub fn verify(&self, log: &LogInfo) -> Result<(), RgetError> {
        let ok = rget_crypto::verify_digitally_signed(
            self.signature.scheme,
            &log.key,
            &self.signature_input(),
            &self.signature.signature,
        )?;
        if ok {
            Ok(())
        } else {
            Err(RgetError::SignatureInvalid {
                reason: format!("tree head signature from {}", log.description),
            })
        }
    }
}

/// Audit path returned by `get-proof-by-hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    /// Index of the leaf in the tree.
    pub leaf_index: u64,
    /// Sibling hashes, leaf side first.
    pub audit_path: Vec<Hash>,
}

/// Read access to a CT log.
#[async_trait::async_trait]
pub trait LogClient: Send + Sync {
    /// Fetch the latest signed tree head.
    async fn get_sth(&self, log: &LogInfo) -> Result<SignedTreeHead, RgetError>;

    /// Fetch the audit path for `leaf_hash` in the tree of `tree_size`.
    async fn get_proof_by_hash(
        &self,
        log: &LogInfo,
        leaf_hash: &Hash,
        tree_size: u64,
    ) -> Result<InclusionProof, RgetError>;
}

/// [`LogClient`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpLogClient {
    client: Client,
}

#[derive(Deserialize)]
struct GetSthResponse {
    tree_size: u64,
    timestamp: u64,
    sha256_root_hash: String,
    tree_head_signature: String,
}

#[derive(Deserialize)]
struct GetProofByHashResponse {
    leaf_index: u64,
    audit_path: Vec<String>,
}

impl HttpLogClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, RgetError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RgetError> {
        debug!("Querying {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RgetError::http(format!("Log request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RgetError::http(format!(
                "Log HTTP error from {url}: {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RgetError::http(format!("Failed to parse log response from {url}: {e}")))
    }
}

#[async_trait::async_trait]
impl LogClient for HttpLogClient {
    #[instrument(skip(self, log), fields(log = %log.description))]
    async fn get_sth(&self, log: &LogInfo) -> Result<SignedTreeHead, RgetError> {
        let url = format!("{}ct/v1/get-sth", log.url);
        let sth: GetSthResponse = self.get_json(&url, &[]).await?;

        Ok(SignedTreeHead {
            tree_size: sth.tree_size,
            timestamp: sth.timestamp,
            root_hash: decode_hash(&sth.sha256_root_hash)?,
            signature: DigitallySigned::from_bytes(&decode_b64(&sth.tree_head_signature)?)?,
        })
    }

    #[instrument(skip(self, log, leaf_hash), fields(log = %log.description))]
    async fn get_proof_by_hash(
        &self,
        log: &LogInfo,
        leaf_hash: &Hash,
        tree_size: u64,
    ) -> Result<InclusionProof, RgetError> {
        let url = format!("{}ct/v1/get-proof-by-hash", log.url);
        let query = [
            ("hash", BASE64.encode(leaf_hash)),
            ("tree_size", tree_size.to_string()),
        ];
        let proof: GetProofByHashResponse = self.get_json(&url, &query).await?;

        Ok(InclusionProof {
            leaf_index: proof.leaf_index,
            audit_path: proof
                .audit_path
                .iter()
                .map(|h| decode_hash(h))
                .collect::<Result<_, _>>()?,
        })
    }
}

fn decode_b64(s: &str) -> Result<Vec<u8>, RgetError> {
    BASE64
        .decode(s.as_bytes())
        .map_err(|e| RgetError::parse(format!("bad base64 in log response: {e}")))
}

fn decode_hash(s: &str) -> Result<Hash, RgetError> {
    decode_b64(s)?
        .try_into()
        .map_err(|v: Vec<u8>| RgetError::parse(format!("expected 32-byte hash, got {}", v.len())))
}
