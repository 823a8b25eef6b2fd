//! Hashers (feature-gated) and utilities for implementing them.

use crate::tree::Node;

/// A commitment-tree node hash function specialized for 32 byte child nodes.
///
/// The combiner is parameterized by the level of the parent being derived so
/// that each layer of the tree is domain-separated: the same pair of children
/// yields different parents at different heights. Level 0 parents two leaves.
///
/// Determinism is load-bearing here: the root of a given sequence of leaves
/// must be identical no matter which code path computed it, since witnesses
/// maintained incrementally and roots computed from the frontier must agree.
pub trait NodeHasher {
    /// Combine two sibling nodes at the given level into their parent node.
    fn combine(level: usize, left: &Node, right: &Node) -> Node;

    /// The hash standing in for an unoccupied leaf slot.
    fn empty_leaf() -> Node {
        [0u8; 32]
    }
}

/// The root of an empty subtree of the given height.
///
/// Level 0 is the empty leaf itself; each level above is the combination of
/// two empty subtrees of the level below.
pub fn empty_root<H: NodeHasher>(level: usize) -> Node {
    let mut node = H::empty_leaf();
    for l in 0..level {
        node = H::combine(l, &node, &node);
    }
    node
}

/// A simple trait for representing binary hash functions.
pub trait BinaryHash {
    /// Given a bit-string, produce a 32-byte hash.
    fn hash(input: &[u8]) -> [u8; 32];

    /// An optional specialization of `hash` for a level byte followed by two
    /// 32-byte inputs, left and right.
    fn hash_level_concat(level: u8, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut buf = [0u8; 65];
        buf[0] = level;
        buf[1..33].copy_from_slice(left);
        buf[33..65].copy_from_slice(right);
        Self::hash(&buf)
    }
}

/// A node hasher constructed from a simple binary hasher.
///
/// This implements [`NodeHasher`] by hashing a one-byte level tag followed by
/// the two child nodes.
///
/// The binary hash wrapped by this structure must behave approximately like a
/// random oracle over the space 2^256. Functions like Sha2/Blake3/Keccak all
/// meet this criterion.
pub struct BinaryHasher<H>(core::marker::PhantomData<H>);

impl<H: BinaryHash> NodeHasher for BinaryHasher<H> {
    fn combine(level: usize, left: &Node, right: &Node) -> Node {
        debug_assert!(level < 64);
        H::hash_level_concat(level as u8, left, right)
    }
}

#[cfg(any(feature = "blake3-hasher", test))]
pub use blake3::Blake3Hasher;

/// A node hasher making use of blake3.
#[cfg(any(feature = "blake3-hasher", test))]
pub mod blake3 {
    use super::{BinaryHash, BinaryHasher};

    /// A [`BinaryHash`] implementation for Blake3.
    pub struct Blake3BinaryHasher;

    /// A wrapper around Blake3 for use in the commitment tree.
    pub type Blake3Hasher = BinaryHasher<Blake3BinaryHasher>;

    impl BinaryHash for Blake3BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            blake3::hash(value).into()
        }

        fn hash_level_concat(level: u8, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&[level]);
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
    }
}

#[cfg(feature = "sha2-hasher")]
pub use sha2::Sha2Hasher;

/// A node hasher making use of sha2-256.
#[cfg(feature = "sha2-hasher")]
pub mod sha2 {
    use super::{BinaryHash, BinaryHasher};
    use sha2::{Digest, Sha256};

    /// A [`BinaryHash`] implementation for Sha2.
    pub struct Sha2BinaryHasher;

    /// A wrapper around sha2-256 for use in the commitment tree.
    pub type Sha2Hasher = BinaryHasher<Sha2BinaryHasher>;

    impl BinaryHash for Sha2BinaryHasher {
        fn hash(value: &[u8]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(value);
            hasher.finalize().into()
        }

        fn hash_level_concat(level: u8, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update([level]);
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
    }
}
