//! The registry of anchors still considered valid for proof verification.
//!
//! An anchor is live while at least one retained checkpoint produced it.
//! Roots are reference-counted because consecutive empty blocks publish the
//! same root at different heights.

use std::collections::HashMap;

use treestate_core::{Anchor, Node};

struct AnchorEntry {
    tree_size: u64,
    refs: usize,
}

/// Maps live anchor roots to the tree size that produced them.
pub struct AnchorRegistry {
    live: HashMap<Node, AnchorEntry>,
    latest: Anchor,
}

impl AnchorRegistry {
    /// Create a registry holding only the given genesis anchor.
    pub fn new(genesis: Anchor) -> Self {
        let mut live = HashMap::new();
        live.insert(
            genesis.root,
            AnchorEntry {
                tree_size: genesis.tree_size,
                refs: 1,
            },
        );
        AnchorRegistry {
            live,
            latest: genesis,
        }
    }

    /// Record a newly published anchor and make it the latest.
    pub fn register(&mut self, anchor: Anchor) {
        self.live
            .entry(anchor.root)
            .and_modify(|e| {
                e.refs += 1;
                e.tree_size = anchor.tree_size;
            })
            .or_insert(AnchorEntry {
                tree_size: anchor.tree_size,
                refs: 1,
            });
        self.latest = anchor;
    }

    /// Drop one reference to an anchor whose checkpoint was evicted or rolled
    /// back. The root stops validating once its last reference is gone.
    pub fn retire(&mut self, anchor: &Anchor) {
        if let Some(entry) = self.live.get_mut(&anchor.root) {
            entry.refs -= 1;
            if entry.refs == 0 {
                self.live.remove(&anchor.root);
            }
        }
    }

    /// Reset the latest anchor, used after a rollback.
    pub fn set_latest(&mut self, anchor: Anchor) {
        self.latest = anchor;
    }

    /// Whether a proof referencing this root can still be validated.
    pub fn is_valid(&self, root: &Node) -> bool {
        self.live.contains_key(root)
    }

    /// The tree size that produced a live root, if any.
    pub fn tree_size_of(&self, root: &Node) -> Option<u64> {
        self.live.get(root).map(|e| e.tree_size)
    }

    /// The most recently published anchor.
    pub fn latest(&self) -> Anchor {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(root: u8, size: u64) -> Anchor {
        Anchor {
            root: [root; 32],
            tree_size: size,
        }
    }

    #[test]
    fn registration_and_retirement() {
        let mut reg = AnchorRegistry::new(anchor(0, 0));
        reg.register(anchor(1, 5));
        assert!(reg.is_valid(&[1; 32]));
        assert_eq!(reg.latest(), anchor(1, 5));
        assert_eq!(reg.tree_size_of(&[1; 32]), Some(5));

        reg.retire(&anchor(1, 5));
        assert!(!reg.is_valid(&[1; 32]));
        assert!(reg.is_valid(&[0; 32]));
    }

    #[test]
    fn repeated_roots_are_refcounted() {
        // Two empty blocks publish the same root at different heights.
        let mut reg = AnchorRegistry::new(anchor(0, 0));
        reg.register(anchor(2, 7));
        reg.register(anchor(2, 7));
        reg.retire(&anchor(2, 7));
        assert!(reg.is_valid(&[2; 32]));
        reg.retire(&anchor(2, 7));
        assert!(!reg.is_valid(&[2; 32]));
    }
}
