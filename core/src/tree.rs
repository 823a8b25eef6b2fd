//! The fixed-depth, append-only note-commitment tree.
//!
//! The tree is represented incrementally by its *frontier*: the rightmost
//! leaf or pair of leaves plus, for every level above, the hash of the
//! completed left sibling subtree if one exists at that level. This makes
//! appending a leaf O(depth) rather than O(n), while the root remains a pure
//! function of the leaves appended so far.
//!
//! Leaves are never removed. A leaf's position is its insertion index, and
//! once appended, the leaf and every completed subtree hash above it are
//! immutable.

use core::fmt;
use core::marker::PhantomData;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::hasher::{empty_root, NodeHasher};

/// A node in the commitment tree. Always 256 bits.
pub type Node = [u8; 32];

/// A note commitment, the unit stored as a tree leaf.
pub type Commitment = [u8; 32];

/// The insertion index of a leaf.
pub type Position = u64;

/// The depth of the production commitment tree.
pub const TREE_DEPTH: usize = 32;

/// Error returned when appending to a tree that already holds 2^depth leaves.
///
/// This is fatal for the tree instance: an exhausted tree never accepts
/// another leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeFull;

impl fmt::Display for TreeFull {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "commitment tree is at maximum capacity")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TreeFull {}

/// A tree root paired with the tree size that produced it.
///
/// Anchors are the public reference points proofs are checked against; two
/// anchors are interchangeable only if both fields agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct Anchor {
    /// The root hash.
    pub root: Node,
    /// The number of leaves in the tree that produced the root.
    pub tree_size: u64,
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Anchor({}, size={})", hex::encode(self.root), self.tree_size)
    }
}

/// The incremental frontier of an append-only Merkle tree of depth `DEPTH`.
///
/// `left` and `right` hold the current rightmost leaf pair; `parents[i]`
/// holds the completed left sibling at level `i + 1`, if any. This is the
/// minimal state needed to append leaves and compute the root.
pub struct CommitmentTree<H, const DEPTH: usize = TREE_DEPTH> {
    pub(crate) left: Option<Node>,
    pub(crate) right: Option<Node>,
    pub(crate) parents: Vec<Option<Node>>,
    _hasher: PhantomData<H>,
}

impl<H, const DEPTH: usize> Clone for CommitmentTree<H, DEPTH> {
    fn clone(&self) -> Self {
        CommitmentTree {
            left: self.left,
            right: self.right,
            parents: self.parents.clone(),
            _hasher: PhantomData,
        }
    }
}

impl<H, const DEPTH: usize> PartialEq for CommitmentTree<H, DEPTH> {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left && self.right == other.right && self.parents == other.parents
    }
}

impl<H, const DEPTH: usize> Eq for CommitmentTree<H, DEPTH> {}

impl<H, const DEPTH: usize> Default for CommitmentTree<H, DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, const DEPTH: usize> CommitmentTree<H, DEPTH> {
    /// Create an empty tree.
    pub fn new() -> Self {
        CommitmentTree {
            left: None,
            right: None,
            parents: Vec::new(),
            _hasher: PhantomData,
        }
    }

    /// The number of leaves appended so far.
    pub fn size(&self) -> u64 {
        let mut size = self.left.is_some() as u64 + self.right.is_some() as u64;
        for (i, parent) in self.parents.iter().enumerate() {
            if parent.is_some() {
                size += 1 << (i + 1);
            }
        }
        size
    }

    /// The commitment most recently appended, if any.
    pub fn last_leaf(&self) -> Option<&Node> {
        self.right.as_ref().or(self.left.as_ref())
    }

    /// Whether every slot up to the given depth is occupied.
    pub(crate) fn is_complete(&self, depth: usize) -> bool {
        if self.left.is_none() || self.right.is_none() {
            return false;
        }
        if self.parents.len() != depth.saturating_sub(1) {
            return false;
        }
        self.parents.iter().all(|p| p.is_some())
    }

    /// The level of the next uncle node a witness rooted at this frontier is
    /// waiting for, skipping the first `skip` vacant slots.
    pub(crate) fn next_uncle_level(&self, mut skip: usize) -> usize {
        if self.left.is_none() {
            if skip > 0 {
                skip -= 1;
            } else {
                return 0;
            }
        }
        if self.right.is_none() {
            if skip > 0 {
                skip -= 1;
            } else {
                return 0;
            }
        }
        let mut level = 1;
        for parent in &self.parents {
            if parent.is_none() {
                if skip > 0 {
                    skip -= 1;
                } else {
                    return level;
                }
            }
            level += 1;
        }
        level + skip
    }
}

impl<H: NodeHasher, const DEPTH: usize> CommitmentTree<H, DEPTH> {
    /// Append a commitment as the next leaf.
    ///
    /// Returns the position assigned to the leaf, or [`TreeFull`] once the
    /// tree holds 2^DEPTH leaves.
    pub fn append(&mut self, leaf: Commitment) -> Result<Position, TreeFull> {
        if self.is_complete(DEPTH) {
            return Err(TreeFull);
        }
        let position = self.size();
        if self.left.is_none() {
            self.left = Some(leaf);
        } else if self.right.is_none() {
            self.right = Some(leaf);
        } else {
            // UNWRAP: both leaf slots occupied, checked above.
            let mut combined = H::combine(0, &self.left.unwrap(), &self.right.unwrap());
            self.left = Some(leaf);
            self.right = None;

            let mut level = 0;
            loop {
                if level < self.parents.len() {
                    match self.parents[level].take() {
                        Some(prior) => {
                            combined = H::combine(level + 1, &prior, &combined);
                            level += 1;
                        }
                        None => {
                            self.parents[level] = Some(combined);
                            break;
                        }
                    }
                } else {
                    self.parents.push(Some(combined));
                    break;
                }
            }
        }
        Ok(position)
    }

    /// The root of the tree at its full depth. Pure and deterministic: the
    /// same sequence of appended leaves always yields the same root.
    pub fn root(&self) -> Node {
        self.root_with(DEPTH, &mut |level| empty_root::<H>(level))
    }

    /// The current root paired with the current size.
    pub fn anchor(&self) -> Anchor {
        Anchor {
            root: self.root(),
            tree_size: self.size(),
        }
    }

    /// The root of this frontier considered as a subtree of the given depth.
    pub(crate) fn root_at(&self, depth: usize) -> Node {
        self.root_with(depth, &mut |level| empty_root::<H>(level))
    }

    /// Compute the root up to `depth`, drawing any node right of the frontier
    /// from `filler`. Witnesses pass a filler that yields their recorded
    /// uncles in order; the plain root uses empty subtree roots.
    pub(crate) fn root_with(
        &self,
        depth: usize,
        filler: &mut impl FnMut(usize) -> Node,
    ) -> Node {
        let left = self.left.unwrap_or_else(|| filler(0));
        let right = self.right.unwrap_or_else(|| filler(0));
        let mut root = H::combine(0, &left, &right);
        for level in 1..depth {
            root = match self.parents.get(level - 1).copied().flatten() {
                Some(parent) => H::combine(level, &parent, &root),
                None => {
                    let uncle = filler(level);
                    H::combine(level, &root, &uncle)
                }
            };
        }
        root
    }
}

impl<H: NodeHasher, const DEPTH: usize> fmt::Debug for CommitmentTree<H, DEPTH> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommitmentTree")
            .field("size", &self.size())
            .field("root", &hex::encode(self.root()))
            .finish()
    }
}
