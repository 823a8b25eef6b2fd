//! Witness tracking, checkpointing, and bounded rollback.
//!
//! The tracker owns the global commitment tree and one incremental witness
//! per note of interest. Every appended commitment is folded into every live
//! witness, so a single pass over a block keeps all witnesses synchronized
//! with the tree.
//!
//! Checkpoints are immutable snapshots of (tree frontier, witness set) taken
//! at each block height and kept in a ring bounded by the retention window.
//! The items are pushed onto the back and popped from the front; checkpoints
//! past the window are discarded, which is when their anchors stop
//! validating and rollback to their height becomes unsupported.
//!
//! A checkpoint handed out to a build is a value: eviction or rollback of
//! the original never touches the copy.

use std::collections::{BTreeMap, HashMap, VecDeque};

use treestate_core::hasher::NodeHasher;
use treestate_core::{
    Anchor, AuthPath, Commitment, CommitmentTree, IncrementalWitness, Position, TreeFull,
};

use crate::anchors::AnchorRegistry;
use crate::errors::{RollbackUnsupportedError, StaleWitnessError, TrackError};
use crate::note::{Note, Value};

/// An immutable snapshot of tree and witness state at a block height.
pub struct Checkpoint<H: NodeHasher> {
    /// The block height this checkpoint was published at.
    pub height: u64,
    /// The tree frontier as of this height.
    pub tree: CommitmentTree<H>,
    /// Witnesses of all live notes, keyed by position.
    pub witnesses: HashMap<Position, IncrementalWitness<H>>,
}

impl<H: NodeHasher> Checkpoint<H> {
    /// The anchor this checkpoint published.
    pub fn anchor(&self) -> Anchor {
        self.tree.anchor()
    }
}

impl<H: NodeHasher> Clone for Checkpoint<H> {
    fn clone(&self) -> Self {
        Checkpoint {
            height: self.height,
            tree: self.tree.clone(),
            witnesses: self.witnesses.clone(),
        }
    }
}

struct TrackedNote {
    note: Note,
    spent: bool,
}

/// Maintains witnesses for every note of interest as the tree grows, and the
/// bounded checkpoint ring enabling rollback on chain reorganization.
pub struct WitnessTracker<H: NodeHasher> {
    tree: CommitmentTree<H>,
    witnesses: HashMap<Position, IncrementalWitness<H>>,
    notes: BTreeMap<Position, TrackedNote>,
    checkpoints: VecDeque<Checkpoint<H>>,
    retention: usize,
    anchors: AnchorRegistry,
}

impl<H: NodeHasher> WitnessTracker<H> {
    /// Create a tracker over an empty tree, retaining at most `retention`
    /// checkpoints. A genesis checkpoint at height 0 is published
    /// immediately.
    pub fn new(retention: usize) -> Self {
        assert!(retention >= 1, "retention window must hold a checkpoint");
        let tree = CommitmentTree::new();
        let genesis = Checkpoint {
            height: 0,
            tree: tree.clone(),
            witnesses: HashMap::new(),
        };
        let anchors = AnchorRegistry::new(genesis.anchor());
        let mut checkpoints = VecDeque::new();
        checkpoints.push_back(genesis);
        WitnessTracker {
            tree,
            witnesses: HashMap::new(),
            notes: BTreeMap::new(),
            checkpoints,
            retention,
            anchors,
        }
    }

    /// Append one commitment to the tree, folding it into every live
    /// witness. Must be called in tree order for every new leaf.
    pub fn append(&mut self, commitment: Commitment) -> Result<Position, TreeFull> {
        for witness in self.witnesses.values_mut() {
            witness.append(commitment)?;
        }
        self.tree.append(commitment)
    }

    /// Begin maintaining a witness for the most recently appended leaf,
    /// which carries the given value. Returns the tracked note.
    pub fn track_latest(&mut self, value: Value) -> Option<Note> {
        let commitment = *self.tree.last_leaf()?;
        let note = Note {
            commitment,
            value,
            position: self.tree.size() - 1,
        };
        self.begin_witness(note);
        Some(note)
    }

    /// Begin maintaining a witness for a freshly-created note.
    ///
    /// The note must be the most recently appended leaf; a witness cannot be
    /// started retroactively.
    pub fn track(&mut self, note: Note) -> Result<(), TrackError> {
        let tree_size = self.tree.size();
        if tree_size == 0
            || note.position != tree_size - 1
            || self.tree.last_leaf() != Some(&note.commitment)
        {
            return Err(TrackError {
                position: note.position,
                tree_size,
            });
        }
        self.begin_witness(note);
        Ok(())
    }

    fn begin_witness(&mut self, note: Note) {
        self.witnesses
            .insert(note.position, IncrementalWitness::from_tree(self.tree.clone()));
        self.notes.insert(note.position, TrackedNote { note, spent: false });
    }

    /// Publish a checkpoint at the given height and evict any checkpoints
    /// that fall outside the retention window.
    pub fn checkpoint(&mut self, height: u64) {
        let checkpoint = Checkpoint {
            height,
            tree: self.tree.clone(),
            witnesses: self.witnesses.clone(),
        };
        self.anchors.register(checkpoint.anchor());
        self.checkpoints.push_back(checkpoint);
        while self.checkpoints.len() > self.retention {
            // UNWRAP: length checked above.
            let evicted = self.checkpoints.pop_front().unwrap();
            self.anchors.retire(&evicted.anchor());
        }
    }

    /// Restore the tree and witness state captured at `to_height`.
    ///
    /// Checkpoints above the target are discarded and their anchors retired.
    /// Fails if the target height predates the retention window.
    pub fn rollback(&mut self, to_height: u64) -> Result<(), RollbackUnsupportedError> {
        let index = self
            .checkpoints
            .iter()
            .rposition(|c| c.height == to_height)
            .ok_or(RollbackUnsupportedError {
                requested_height: to_height,
                oldest_retained: self.oldest_height(),
            })?;
        for dropped in self.checkpoints.drain(index + 1..) {
            self.anchors.retire(&dropped.anchor());
        }
        // UNWRAP: `index` is in bounds, the drain above kept 0..=index.
        let checkpoint = self.checkpoints.back().unwrap();
        self.tree = checkpoint.tree.clone();
        self.witnesses = checkpoint.witnesses.clone();
        self.anchors.set_latest(checkpoint.anchor());
        let size = self.tree.size();
        self.notes.retain(|position, _| *position < size);
        Ok(())
    }

    /// The witness for a note as of the checkpoint at `at_height`.
    ///
    /// Fails once the height leaves the retention window, or if the note was
    /// not tracked at that height.
    pub fn witness_for(
        &self,
        position: Position,
        at_height: u64,
    ) -> Result<AuthPath, StaleWitnessError> {
        let stale = StaleWitnessError {
            requested_height: at_height,
            oldest_retained: self.oldest_height(),
        };
        let checkpoint = self
            .checkpoints
            .iter()
            .rev()
            .find(|c| c.height == at_height)
            .ok_or(stale)?;
        let witness = checkpoint.witnesses.get(&position).ok_or(stale)?;
        Ok(witness.auth_path())
    }

    /// The current witness for a live note, if tracked.
    pub fn witness_snapshot(&self, position: Position) -> Option<AuthPath> {
        self.witnesses.get(&position).map(|w| w.auth_path())
    }

    /// The most recent checkpoint. At least one is always retained.
    pub fn latest_checkpoint(&self) -> &Checkpoint<H> {
        // UNWRAP: the constructor publishes a genesis checkpoint and
        // eviction never drops below `retention >= 1`.
        self.checkpoints.back().unwrap()
    }

    /// The current anchor of the global tree.
    pub fn current_anchor(&self) -> Anchor {
        self.tree.anchor()
    }

    /// The registry of anchors still valid for proof verification.
    pub fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    /// All tracked, unspent notes in position order.
    pub fn spendable_notes(&self) -> Vec<Note> {
        self.notes
            .values()
            .filter(|t| !t.spent)
            .map(|t| t.note)
            .collect()
    }

    /// Total value of tracked, unspent notes.
    pub fn spendable_value(&self) -> Value {
        self.notes
            .values()
            .filter(|t| !t.spent)
            .map(|t| t.note.value)
            .sum()
    }

    /// Mark the given positions spent. Positions that are not tracked
    /// (virtual change notes consumed within a build) are ignored.
    pub fn mark_spent(&mut self, positions: &[Position]) {
        for position in positions {
            if let Some(tracked) = self.notes.get_mut(position) {
                tracked.spent = true;
            }
        }
    }

    fn oldest_height(&self) -> Option<u64> {
        self.checkpoints.front().map(|c| c.height)
    }
}
