//! An in-memory CT log that issues SCTs and serves proofs.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rget_core::ct::{
    DigitallySigned, InclusionProof, LogClient, LogInfo, MerkleTreeLeaf, SignedCertificateTimestamp,
    SignedTreeHead,
};
use rget_core::{Hash, MerkleAccumulator, RgetError};
use rget_crypto::{P256Signer, RsaSigner, Signer};

pub const HOUR_MS: u64 = 60 * 60 * 1000;

pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap()
}

const RSA_KEY: &[u8] = include_bytes!("../../../rget-crypto/testdata/rsa2048-key.der");

pub struct FakeLog {
    signer: Box<dyn Signer + Send + Sync>,
    pub info: LogInfo,
    tree: Mutex<MerkleAccumulator>,
    pub calls: AtomicUsize,
    pub offline: AtomicBool,
    /// Milliseconds `get_sth` waits before answering.
    pub stall_ms: AtomicU64,
}

impl FakeLog {
    pub fn new(mmd: Duration) -> Self {
        Self::with_signer(Box::new(P256Signer::random()), mmd)
    }

    /// A log that signs with RSA PKCS#1 v1.5.
    pub fn rsa(mmd: Duration) -> Self {
        Self::with_signer(Box::new(RsaSigner::from_pkcs8_der(RSA_KEY).unwrap()), mmd)
    }

    fn with_signer(signer: Box<dyn Signer + Send + Sync>, mmd: Duration) -> Self {
        let key = signer.public_key_der().unwrap();
        let mut tree = MerkleAccumulator::new();
        // Unrelated entries so proofs have real audit paths.
        for i in 0..5u8 {
            tree.add_leaf(&[i; 16]);
        }
        Self {
            signer,
            info: LogInfo::new("Fake Log", key, "https://ct.fake.example/", mmd),
            tree: Mutex::new(tree),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            stall_ms: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sign an SCT for `leaf` at `timestamp`.
    pub fn issue(&self, leaf: &MerkleTreeLeaf, timestamp: u64) -> SignedCertificateTimestamp {
        self.issue_with(self.signer.as_ref(), leaf, timestamp)
    }

    /// Sign an SCT claiming to be from this log with someone else's key.
    pub fn forge(&self, leaf: &MerkleTreeLeaf, timestamp: u64) -> SignedCertificateTimestamp {
        self.issue_with(&P256Signer::random(), leaf, timestamp)
    }

    fn issue_with(
        &self,
        signer: &dyn Signer,
        leaf: &MerkleTreeLeaf,
        timestamp: u64,
    ) -> SignedCertificateTimestamp {
        let mut sct = SignedCertificateTimestamp {
            log_id: self.info.log_id,
            timestamp,
            extensions: Vec::new(),
            signature: DigitallySigned {
                scheme: signer.scheme(),
                signature: Vec::new(),
            },
        };
        let input = leaf.with_sct(&sct).signature_input().unwrap();
        sct.signature.signature = signer.sign(&input).unwrap();
        sct
    }

    /// Incorporate the entry `sct` was issued for.
    pub fn merge(&self, leaf: &MerkleTreeLeaf, sct: &SignedCertificateTimestamp) {
        let bytes = leaf.with_sct(sct).to_bytes().unwrap();
        self.tree.lock().unwrap().add_leaf(&bytes);
    }

    fn check_online(&self) -> Result<(), RgetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RgetError::http("connection refused"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogClient for FakeLog {
    async fn get_sth(&self, _log: &LogInfo) -> Result<SignedTreeHead, RgetError> {
        self.check_online()?;
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        let tree = self.tree.lock().unwrap();
        let mut sth = SignedTreeHead {
            tree_size: tree.len(),
            timestamp: now_ms(),
            root_hash: tree.current_root(),
            signature: DigitallySigned {
                scheme: self.signer.scheme(),
                signature: Vec::new(),
            },
        };
        sth.signature.signature = self.signer.sign(&sth.signature_input()).unwrap();
        Ok(sth)
    }

    async fn get_proof_by_hash(
        &self,
        _log: &LogInfo,
        leaf_hash: &Hash,
        tree_size: u64,
    ) -> Result<InclusionProof, RgetError> {
        self.check_online()?;
        let tree = self.tree.lock().unwrap();
        assert_eq!(tree_size, tree.len());
        let leaf_index = (0..tree.len())
            .find(|&i| tree.leaf_hash(i).as_ref() == Some(leaf_hash))
            .ok_or_else(|| RgetError::http("HTTP 400 Bad Request: no such leaf"))?;
        Ok(InclusionProof {
            leaf_index,
            audit_path: tree.inclusion_proof(leaf_index).unwrap(),
        })
    }
}
