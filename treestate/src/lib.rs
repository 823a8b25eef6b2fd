//! Incremental note-commitment tree state for a shielded wallet.
//!
//! The service owns an append-only commitment tree, maintains an incremental
//! witness per note of interest, and retains a bounded ring of per-block
//! checkpoints enabling rollback after chain reorganizations. On top of that
//! sits an asynchronous transaction builder: a build captures one checkpoint,
//! then partitions the transfer into bounded proof steps chained through
//! virtual change notes, so blocks accepted while proofs are generated never
//! invalidate the work in progress.
//!
//! [`TreeState`] is the shared-state facade; everything behind it is reached
//! through a [`parking_lot::RwLock`], with block connection taking the write
//! lock and builds only briefly taking the read lock to capture a snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use treestate_core::hasher::NodeHasher;

pub use treestate_core::hasher;
pub use treestate_core::{
    Anchor, AuthPath, Commitment, CommitmentTree, IncrementalWitness, Node, Position, TREE_DEPTH,
};

pub use crate::builder::{
    BuildRequest, BuildSnapshot, BuilderConfig, MockProver, Proof, ProofContext, ProofStep,
    ProofSystem, SpendDescription, StepAnchor, Transaction, TransactionBuilder,
};
pub use crate::errors::{
    AnchorMismatchError, BuildError, InsufficientFundsError, ProofGenerationError,
    RollbackUnsupportedError, StaleWitnessError, TrackError, TreeFull,
};
pub use crate::note::{Note, Output, Value};
pub use crate::options::Options;
pub use crate::scheduler::{OperationId, OperationStatus};

pub mod anchors;
pub mod builder;
pub mod errors;
pub mod note;
mod options;
pub mod scheduler;
pub mod tracker;

use crate::anchors::AnchorRegistry;
use crate::scheduler::OperationScheduler;
use crate::tracker::WitnessTracker;

/// One commitment carried by a connected block, optionally one of ours.
#[derive(Clone, Copy, Debug)]
pub struct BlockEntry {
    /// The note commitment appended to the tree.
    pub commitment: Commitment,
    /// `Some` if the note belongs to this wallet and a witness should be
    /// maintained for it.
    pub note_value: Option<Value>,
}

impl BlockEntry {
    /// A commitment belonging to someone else; appended but not witnessed.
    pub fn new(commitment: Commitment) -> Self {
        BlockEntry {
            commitment,
            note_value: None,
        }
    }

    /// A commitment of our own note carrying the given value.
    pub fn retained(commitment: Commitment, value: Value) -> Self {
        BlockEntry {
            commitment,
            note_value: Some(value),
        }
    }
}

struct Shared<H: NodeHasher> {
    tracker: RwLock<WitnessTracker<H>>,
    scheduler: OperationScheduler,
    prover: Arc<dyn ProofSystem>,
    builder_config: BuilderConfig,
}

/// The treestate service facade. Cheap to clone and share across threads.
pub struct TreeState<H: NodeHasher> {
    shared: Arc<Shared<H>>,
}

impl<H: NodeHasher> Clone for TreeState<H> {
    fn clone(&self) -> Self {
        TreeState {
            shared: self.shared.clone(),
        }
    }
}

impl<H: NodeHasher + Send + Sync + 'static> TreeState<H> {
    /// Open a treestate instance with the given options.
    pub fn open(mut o: Options) -> anyhow::Result<Self> {
        anyhow::ensure!(
            o.retention_window >= 1,
            "retention window must hold at least one checkpoint"
        );
        anyhow::ensure!(
            o.step_capacity >= 2,
            "step capacity below 2 cannot chain change alongside an input"
        );
        let prover = o
            .proof_system
            .take()
            .unwrap_or_else(|| Arc::new(MockProver::<H>::new()));
        Ok(Self {
            shared: Arc::new(Shared {
                tracker: RwLock::new(WitnessTracker::new(o.retention_window)),
                scheduler: OperationScheduler::new(o.build_workers),
                prover,
                builder_config: BuilderConfig {
                    step_capacity: o.step_capacity,
                    step_fee: o.step_fee,
                    change_seed: o.change_seed,
                },
            }),
        })
    }

    /// Connect one block: append every commitment in order, begin witnesses
    /// for retained notes, and publish the checkpoint for `height`.
    ///
    /// Atomic with respect to readers; no query observes a partially
    /// connected block.
    pub fn connect_block(&self, height: u64, entries: &[BlockEntry]) -> Result<Anchor, TreeFull> {
        let mut tracker = self.shared.tracker.write();
        for entry in entries {
            tracker.append(entry.commitment)?;
            if let Some(value) = entry.note_value {
                // UNWRAP: a leaf was appended just above.
                tracker.track_latest(value).unwrap();
            }
        }
        tracker.checkpoint(height);
        let anchor = tracker.current_anchor();
        log::debug!(
            "connected block {}: {} commitments, anchor size {}",
            height,
            entries.len(),
            anchor.tree_size
        );
        Ok(anchor)
    }

    /// Disconnect the block at `height`, restoring the state checkpointed at
    /// `height - 1`.
    pub fn disconnect_block(&self, height: u64) -> Result<(), RollbackUnsupportedError> {
        let target = height.checked_sub(1).ok_or(RollbackUnsupportedError {
            requested_height: 0,
            oldest_retained: None,
        })?;
        self.rollback_to(target)
    }

    /// Roll back to the checkpoint published at `height`, discarding
    /// everything above it.
    pub fn rollback_to(&self, height: u64) -> Result<(), RollbackUnsupportedError> {
        let mut tracker = self.shared.tracker.write();
        tracker.rollback(height)?;
        log::debug!("rolled back to height {}", height);
        Ok(())
    }

    /// The anchor of the current tree.
    pub fn current_anchor(&self) -> Anchor {
        self.shared.tracker.read().current_anchor()
    }

    /// Whether a proof referencing this root can still be validated, i.e.
    /// whether some retained checkpoint published it.
    pub fn is_valid_anchor(&self, root: &Node) -> bool {
        self.shared.tracker.read().anchors().is_valid(root)
    }

    /// Begin maintaining a witness for a freshly-appended note.
    pub fn track(&self, note: Note) -> Result<(), TrackError> {
        self.shared.tracker.write().track(note)
    }

    /// The current authentication path of a tracked note.
    pub fn witness_snapshot(&self, position: Position) -> Option<AuthPath> {
        self.shared.tracker.read().witness_snapshot(position)
    }

    /// The authentication path of a note as of the checkpoint at
    /// `at_height`.
    pub fn witness_at(
        &self,
        position: Position,
        at_height: u64,
    ) -> Result<AuthPath, StaleWitnessError> {
        self.shared.tracker.read().witness_for(position, at_height)
    }

    /// All tracked, unspent notes in position order.
    pub fn spendable_notes(&self) -> Vec<Note> {
        self.shared.tracker.read().spendable_notes()
    }

    /// Total value of tracked, unspent notes.
    pub fn spendable_value(&self) -> Value {
        self.shared.tracker.read().spendable_value()
    }

    /// Run `f` against the anchor registry.
    pub fn with_anchors<R>(&self, f: impl FnOnce(&AnchorRegistry) -> R) -> R {
        f(self.shared.tracker.read().anchors())
    }

    /// Queue an asynchronous transaction build and return its operation
    /// identifier immediately.
    ///
    /// The build captures its snapshot under a brief read lock when a worker
    /// picks it up; everything after that, proof generation included, runs
    /// without any lock on shared state. On success the spent notes are
    /// marked spent.
    pub fn submit_build(&self, request: BuildRequest) -> OperationId {
        let shared = self.shared.clone();
        self.shared.scheduler.submit(move || {
            let snapshot = {
                let tracker = shared.tracker.read();
                BuildSnapshot {
                    checkpoint: tracker.latest_checkpoint().clone(),
                    notes: tracker.spendable_notes(),
                }
            };
            let builder = TransactionBuilder::new(&snapshot, &shared.builder_config);
            let transaction = builder.build(&request, &*shared.prover)?;
            shared
                .tracker
                .write()
                .mark_spent(&transaction.spent_positions());
            Ok(transaction)
        })
    }

    /// The current status of a build operation, or `None` for an unknown
    /// identifier.
    pub fn query_status(&self, id: &OperationId) -> Option<OperationStatus> {
        self.shared.scheduler.status(id)
    }

    /// Block until a build operation reaches its terminal status.
    pub fn wait_operation(&self, id: &OperationId) -> Option<OperationStatus> {
        self.shared.scheduler.wait_terminal(id)
    }
}
