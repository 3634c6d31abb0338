//! Property-based tests for sum files, Merkle labels and inclusion proofs.

use proptest::prelude::*;

use rget_core::merkle::{hash_leaf, verify_inclusion, MerkleAccumulator};
use rget_core::{UrlSum, UrlSumList};

/// Strategy for a sum list of distinct digests.
fn sum_list(min: usize, max: usize) -> impl Strategy<Value = UrlSumList> {
    prop::collection::btree_set(prop::collection::vec(any::<u8>(), 32), min..=max).prop_map(|sums| {
        sums.into_iter()
            .enumerate()
            .map(|(i, sum)| UrlSum::new(format!("https://example.com/artifact-{i}.tar.gz"), sum).unwrap())
            .collect()
    })
}

/// Strategy for any representable entry: non-empty digest, one-line URL.
fn any_entry() -> impl Strategy<Value = UrlSum> {
    ("[^\r\n]{1,40}", prop::collection::vec(any::<u8>(), 1..48))
        .prop_map(|(url, sum)| UrlSum::new(url, sum).unwrap())
}

/// Strategy for arbitrary leaf data.
fn leaves(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..=max)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Reparsing the text form keeps the label.
    #[test]
    fn domain_survives_text_roundtrip(list in sum_list(1, 16)) {
        let reparsed = UrlSumList::from_sum_file(&list.to_sum_file());
        prop_assert_eq!(reparsed.domain(), list.domain());
    }

    /// Every list, including URLs with spaces, survives its text form.
    #[test]
    fn sum_file_roundtrips(entries in prop::collection::vec(any_entry(), 0..12)) {
        let list: UrlSumList = entries.into_iter().collect();
        prop_assert_eq!(UrlSumList::from_sum_file(&list.to_sum_file()), list);
    }

    /// Swapping two distinct entries changes the label.
    #[test]
    fn domain_is_order_sensitive(
        list in sum_list(2, 16),
        a in any::<prop::sample::Index>(),
        b in any::<prop::sample::Index>(),
    ) {
        let (i, j) = (a.index(list.len()), b.index(list.len()));
        prop_assume!(i != j);

        let mut entries = list.entries().to_vec();
        entries.swap(i, j);
        let swapped: UrlSumList = entries.into_iter().collect();

        prop_assert_ne!(swapped.domain(), list.domain());
    }

    /// The label is two 32-character lowercase hex labels.
    #[test]
    fn domain_is_two_hex_labels(list in sum_list(0, 8)) {
        let domain = list.domain();
        let labels: Vec<&str> = domain.split('.').collect();
        prop_assert_eq!(labels.len(), 2);
        for label in labels {
            prop_assert!(rget_core::wellknown::is_digest_label(label));
        }
        prop_assert_eq!(list.short_domain(), domain[..32].to_string());
    }

    /// Every leaf's audit path verifies against the current root.
    #[test]
    fn inclusion_proofs_verify(data in leaves(40)) {
        let mut tree = MerkleAccumulator::new();
        for d in &data {
            tree.add_leaf(d);
        }
        let root = tree.current_root();

        for (i, d) in data.iter().enumerate() {
            let index = i as u64;
            let proof = tree.inclusion_proof(index).unwrap();
            prop_assert!(verify_inclusion(index, tree.len(), &hash_leaf(d), &proof, &root));
        }
    }

    /// A proof does not verify for a different leaf, index or root.
    #[test]
    fn inclusion_proofs_reject_tampering(
        data in leaves(40),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut tree = MerkleAccumulator::new();
        for d in &data {
            tree.add_leaf(d);
        }
        let root = tree.current_root();
        let index = pick.index(data.len()) as u64;
        let proof = tree.inclusion_proof(index).unwrap();

        let forged = hash_leaf(b"not in the tree");
        prop_assert!(!verify_inclusion(index, tree.len(), &forged, &proof, &root));

        let mut wrong_root = root;
        wrong_root[0] ^= 0x01;
        let leaf = tree.leaf_hash(index).unwrap();
        prop_assert!(!verify_inclusion(index, tree.len(), &leaf, &proof, &wrong_root));
        prop_assert!(!verify_inclusion(tree.len(), tree.len(), &leaf, &proof, &root));
    }
}
