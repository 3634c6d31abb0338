//! RFC 6962 Merkle tree hashing for content-addressed record labels.
//!
//! The root of the tree over a release's digests becomes a public DNS
//! label, so the hashing must match RFC 6962 §2.1 bit-for-bit:
//!
//! - **Leaf hash**: `SHA-256(0x00 || data)`
//! - **Node hash**: `SHA-256(0x01 || left || right)`
//! - **Split**: largest power of two strictly less than the leaf count
//! - **Empty tree**: `SHA-256("")`
//!
//! The same module verifies the audit paths CT logs return for
//! `get-proof-by-hash` (RFC 9162 §2.1.3.2).

use sha2::{Digest, Sha256};

/// Domain separation prefix for leaf hashes.
pub const LEAF_HASH_PREFIX: u8 = 0x00;

/// Domain separation prefix for interior node hashes.
pub const NODE_HASH_PREFIX: u8 = 0x01;

/// A 32-byte SHA-256 tree hash.
pub type Hash = [u8; 32];

/// Append-only Merkle accumulator.
///
/// Leaves are kept as leaf hashes in submission order; the root is
/// recomputed on demand.
#[derive(Debug, Clone, Default)]
pub struct MerkleAccumulator {
    leaf_hashes: Vec<Hash>,
}

impl MerkleAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf and return its index.
    pub fn add_leaf(&mut self, data: &[u8]) -> u64 {
        self.leaf_hashes.push(hash_leaf(data));
        (self.leaf_hashes.len() - 1) as u64
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.leaf_hashes.len() as u64
    }

    /// Whether no leaves have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_hashes.is_empty()
    }

    /// Leaf hash at `index`.
    #[must_use]
    pub fn leaf_hash(&self, index: u64) -> Option<Hash> {
        self.leaf_hashes.get(usize::try_from(index).ok()?).copied()
    }

    /// Root over all leaves added so far.
    #[must_use]
    pub fn current_root(&self) -> Hash {
        if self.leaf_hashes.is_empty() {
            return Sha256::digest([]).into();
        }
        subtree_root(&self.leaf_hashes)
    }

    /// Audit path for the leaf at `index` in the current tree.
    ///
    /// Returns `None` when `index` is out of range.
    #[must_use]
    pub fn inclusion_proof(&self, index: u64) -> Option<Vec<Hash>> {
        let idx = usize::try_from(index).ok()?;
        if idx >= self.leaf_hashes.len() {
            return None;
        }
        let mut proof = Vec::new();
        audit_path(idx, &self.leaf_hashes, &mut proof);
        Some(proof)
    }
}

/// Hash leaf data.
#[must_use]
pub fn hash_leaf(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_HASH_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash two children into their parent.
#[must_use]
pub fn hash_children(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_HASH_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Largest power of two strictly less than `n` (`n >= 2`).
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

/// MTH over a non-empty slice of leaf hashes.
fn subtree_root(leaves: &[Hash]) -> Hash {
    match leaves.len() {
        1 => leaves[0],
        n => {
            let k = split_point(n);
            hash_children(&subtree_root(&leaves[..k]), &subtree_root(&leaves[k..]))
        }
    }
}

/// RFC 6962 PATH(m, D[n]), appended leaf-side first.
fn audit_path(m: usize, leaves: &[Hash], proof: &mut Vec<Hash>) {
    let n = leaves.len();
    if n <= 1 {
        return;
    }
    let k = split_point(n);
    if m < k {
        audit_path(m, &leaves[..k], proof);
        proof.push(subtree_root(&leaves[k..]));
    } else {
        audit_path(m - k, &leaves[k..], proof);
        proof.push(subtree_root(&leaves[..k]));
    }
}

/// Verify an RFC 6962 audit path.
///
/// Recomputes the root from `leaf_hash` at `leaf_index` in a tree of
/// `tree_size` leaves and compares it with `root` in constant time.
#[must_use]
pub fn verify_inclusion(
    leaf_index: u64,
    tree_size: u64,
    leaf_hash: &Hash,
    proof: &[Hash],
    root: &Hash,
) -> bool {
    if leaf_index >= tree_size {
        return false;
    }

    let mut fn_ = leaf_index;
    let mut sn = tree_size - 1;
    let mut r = *leaf_hash;

    for p in proof {
        if sn == 0 {
            return false;
        }
        if fn_ & 1 == 1 || fn_ == sn {
            r = hash_children(p, &r);
            while fn_ & 1 == 0 && fn_ != 0 {
                fn_ >>= 1;
                sn >>= 1;
            }
        } else {
            r = hash_children(&r, p);
        }
        fn_ >>= 1;
        sn >>= 1;
    }

    sn == 0 && rget_crypto::constant_time_eq(&r, root)
}
