//! Per-note incremental witnesses over the commitment tree.
//!
//! An [`IncrementalWitness`] is created at the moment its note's commitment
//! is the last leaf of the tree, and is then fed every subsequently appended
//! commitment via [`IncrementalWitness::append`]. Each append is O(depth),
//! which is what makes maintaining one witness per tracked note viable as
//! the global tree grows.
//!
//! The witness is valid only against the root of the tree at the size it was
//! last synchronized to; [`AuthPath::tree_size`] records that size so callers
//! can check agreement before using the path.

use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};
#[cfg(feature = "std")]
use std::collections::VecDeque;

use crate::hasher::{empty_root, NodeHasher};
use crate::tree::{CommitmentTree, Node, Position, TreeFull, TREE_DEPTH};

/// An authentication path proving a leaf's inclusion in a tree of a given
/// size.
///
/// This is the serializable form of a witness: the leaf position, the
/// ordered sequence of sibling hashes from the leaf level upward, and the
/// tree size the path was synchronized to. Two witnesses are structurally
/// equal exactly when these three components are equal.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct AuthPath {
    /// The position of the witnessed leaf.
    pub position: Position,
    /// Sibling hashes, ordered from the leaf level to just below the root.
    pub siblings: Vec<Node>,
    /// The tree size this path is valid against.
    pub tree_size: u64,
}

impl AuthPath {
    /// Recompute the root implied by this path for the given leaf.
    pub fn root<H: NodeHasher>(&self, leaf: &Node) -> Node {
        let mut node = *leaf;
        let mut index = self.position;
        for (level, sibling) in self.siblings.iter().enumerate() {
            node = if index & 1 == 1 {
                H::combine(level, sibling, &node)
            } else {
                H::combine(level, &node, sibling)
            };
            index >>= 1;
        }
        node
    }
}

/// Supplies the nodes right of a witness's frontier, in the order the
/// witness recorded them, falling back to empty subtree roots.
struct PathFiller {
    queue: VecDeque<Node>,
}

impl PathFiller {
    fn new(queue: VecDeque<Node>) -> Self {
        PathFiller { queue }
    }

    fn next<H: NodeHasher>(&mut self, level: usize) -> Node {
        self.queue
            .pop_front()
            .unwrap_or_else(|| empty_root::<H>(level))
    }
}

/// A witness for a single leaf, kept current by folding in every commitment
/// appended to the tree after it.
///
/// Internally this holds the tree frontier as of the witnessed leaf, the
/// completed uncle subtree roots discovered since (`filled`), and a cursor
/// frontier accumulating the uncle currently under construction.
pub struct IncrementalWitness<H, const DEPTH: usize = TREE_DEPTH> {
    tree: CommitmentTree<H, DEPTH>,
    filled: Vec<Node>,
    cursor: Option<CommitmentTree<H, DEPTH>>,
    cursor_level: usize,
    synced_size: u64,
}

impl<H, const DEPTH: usize> Clone for IncrementalWitness<H, DEPTH> {
    fn clone(&self) -> Self {
        IncrementalWitness {
            tree: self.tree.clone(),
            filled: self.filled.clone(),
            cursor: self.cursor.clone(),
            cursor_level: self.cursor_level,
            synced_size: self.synced_size,
        }
    }
}

impl<H: NodeHasher, const DEPTH: usize> IncrementalWitness<H, DEPTH> {
    /// Begin witnessing the most recently appended leaf of the given tree.
    ///
    /// The frontier must be non-empty; the witnessed leaf is the one at
    /// `tree.size() - 1`.
    pub fn from_tree(tree: CommitmentTree<H, DEPTH>) -> Self {
        assert!(tree.size() > 0, "cannot witness a leaf of an empty tree");
        let synced_size = tree.size();
        IncrementalWitness {
            tree,
            filled: Vec::new(),
            cursor: None,
            cursor_level: 0,
            synced_size,
        }
    }

    /// The position of the witnessed leaf.
    pub fn position(&self) -> Position {
        self.tree.size() - 1
    }

    /// The tree size this witness is synchronized to.
    pub fn synced_size(&self) -> u64 {
        self.synced_size
    }

    /// Fold one newly appended commitment into the witness.
    ///
    /// Must be called once, in tree order, for every leaf appended at or
    /// after `position() + 1`.
    pub fn append(&mut self, commitment: Node) -> Result<(), TreeFull> {
        match &mut self.cursor {
            Some(cursor) => {
                cursor.append(commitment)?;
                if cursor.is_complete(self.cursor_level) {
                    self.filled.push(cursor.root_at(self.cursor_level));
                    self.cursor = None;
                }
            }
            None => {
                let level = self.tree.next_uncle_level(self.filled.len());
                if level >= DEPTH {
                    return Err(TreeFull);
                }
                if level == 0 {
                    self.filled.push(commitment);
                } else {
                    let mut cursor = CommitmentTree::new();
                    // UNWRAP: a fresh tree always accepts a leaf.
                    cursor.append(commitment).unwrap();
                    self.cursor = Some(cursor);
                    self.cursor_level = level;
                }
            }
        }
        self.synced_size += 1;
        Ok(())
    }

    /// The root of the global tree at the size this witness is synchronized
    /// to. The authentication path produced by [`Self::auth_path`] verifies
    /// against exactly this root.
    pub fn root(&self) -> Node {
        let mut filler = self.filler();
        self.tree.root_with(DEPTH, &mut |level| filler.next::<H>(level))
    }

    /// Produce the authentication path for the witnessed leaf.
    pub fn auth_path(&self) -> AuthPath {
        let mut filler = self.filler();
        let mut siblings = Vec::with_capacity(DEPTH);

        if self.tree.right.is_some() {
            // UNWRAP: the right slot is only ever occupied after the left.
            siblings.push(self.tree.left.unwrap());
        } else {
            siblings.push(filler.next::<H>(0));
        }
        for (i, parent) in self.tree.parents.iter().enumerate() {
            match parent {
                Some(node) => siblings.push(*node),
                None => siblings.push(filler.next::<H>(i + 1)),
            }
        }
        for level in self.tree.parents.len() + 1..DEPTH {
            siblings.push(filler.next::<H>(level));
        }

        AuthPath {
            position: self.position(),
            siblings,
            tree_size: self.synced_size,
        }
    }

    fn filler(&self) -> PathFiller {
        let mut queue: VecDeque<Node> = self.filled.iter().copied().collect();
        if let Some(cursor) = &self.cursor {
            queue.push_back(cursor.root_at(self.cursor_level));
        }
        PathFiller::new(queue)
    }
}

impl<H: NodeHasher, const DEPTH: usize> fmt::Debug for IncrementalWitness<H, DEPTH> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IncrementalWitness")
            .field("position", &self.position())
            .field("synced_size", &self.synced_size)
            .finish()
    }
}
