//! Multi-step transaction building against a captured checkpoint.
//!
//! A build captures one checkpoint at start and never consults global state
//! again. When the requested transfer needs more input or output capacity
//! than a single proof step provides, the builder chains steps: step *i*
//! ends in a change note that is not committed to the global tree, and step
//! *i + 1* spends it as a leaf of a private virtual extension of the
//! captured tree.
//!
//! Every step is proven against its own correctly-scoped anchor: the real
//! captured anchor for the first step, and the root of the virtual extension
//! for every later step. A step never falls back to the current global
//! anchor for a virtual note; blocks accepted mid-build therefore cannot
//! corrupt it. If a selected witness disagrees with the step anchor the
//! build aborts with [`AnchorMismatchError`] rather than attempting repair.

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;

use treestate_core::hasher::NodeHasher;
use treestate_core::{Anchor, AuthPath, Commitment, IncrementalWitness, Node, Position};

use crate::errors::{
    AnchorMismatchError, BuildError, InsufficientFundsError, ProofGenerationError,
    StaleWitnessError,
};
use crate::note::{derive_commitment, Note, Output, Value};
use crate::tracker::Checkpoint;

/// An opaque validity proof for one step.
pub type Proof = [u8; 32];

/// The anchor a proof step is scoped to.
///
/// Keeping real and virtual anchors as distinct variants makes it a type
/// error, not a caller-discipline question, to mix a virtual witness with
/// the global anchor or vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepAnchor {
    /// The anchor captured from the global tree at build start.
    Real(Anchor),
    /// The root of the build's private extension of the captured tree.
    Virtual(Anchor),
}

impl StepAnchor {
    /// The root hash proofs against this anchor are checked with.
    pub fn root(&self) -> Node {
        match self {
            StepAnchor::Real(a) | StepAnchor::Virtual(a) => a.root,
        }
    }

    /// The underlying anchor.
    pub fn anchor(&self) -> Anchor {
        match self {
            StepAnchor::Real(a) | StepAnchor::Virtual(a) => *a,
        }
    }

    /// Whether this anchor is a virtual extension rather than a published
    /// root.
    pub fn is_virtual(&self) -> bool {
        matches!(self, StepAnchor::Virtual(_))
    }
}

/// One spent input within a proof step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendDescription {
    /// Leaf position, in the real tree or its virtual extension.
    pub position: Position,
    /// The commitment being spent.
    pub commitment: Commitment,
    /// The value consumed.
    pub value: Value,
    /// The authentication path against the step anchor.
    pub auth_path: AuthPath,
}

/// One bounded-capacity proof step of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofStep {
    /// The anchor this step was proven against.
    pub anchor: StepAnchor,
    /// The inputs consumed.
    pub spends: Vec<SpendDescription>,
    /// The recipient outputs emitted.
    pub outputs: Vec<Output>,
    /// Change carried forward to the next step (or retained by the wallet
    /// in the final step).
    pub change: Value,
    /// The step's validity proof.
    pub proof: Proof,
}

/// A finished multi-step transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// The ordered proof steps.
    pub steps: Vec<ProofStep>,
    /// Total fees paid across all steps.
    pub fee_paid: Value,
}

impl Transaction {
    /// All input positions spent from the real tree (virtual change inputs
    /// excluded, since they never existed in the global tree).
    pub fn spent_positions(&self) -> Vec<Position> {
        let mut positions = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            // A step spends the prior step's change as its first input
            // exactly when that step produced change.
            let chained = i > 0 && self.steps[i - 1].change > 0;
            positions.extend(
                step.spends
                    .iter()
                    .skip(chained as usize)
                    .map(|s| s.position),
            );
        }
        positions
    }
}

/// A transaction build request.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    /// The requested recipient outputs.
    pub outputs: Vec<Output>,
}

/// The immutable view of global state a build operates on, captured once at
/// execution start.
pub struct BuildSnapshot<H: NodeHasher> {
    /// The checkpoint the build is anchored to.
    pub checkpoint: Checkpoint<H>,
    /// Spendable notes, in position order, whose witnesses live in the
    /// checkpoint.
    pub notes: Vec<Note>,
}

/// Everything a proving backend sees for one step.
pub struct ProofContext<'a> {
    /// The anchor root the proof commits to.
    pub anchor: Node,
    /// The inputs, with authentication paths against `anchor`.
    pub spends: &'a [SpendDescription],
    /// The recipient outputs.
    pub outputs: &'a [Output],
    /// The step fee.
    pub fee: Value,
}

/// An opaque, deterministic proving backend.
///
/// Proof generation may be arbitrarily slow; it runs without any lock on
/// shared state and is never retried on failure.
pub trait ProofSystem: Send + Sync {
    /// Generate the validity proof for one step.
    fn prove(&self, ctx: &ProofContext<'_>) -> Result<Proof, ProofGenerationError>;
}

/// A deterministic stand-in proving backend that digests the proof context.
///
/// Useful for tests and wiring: the "proof" is a hash of (anchor, spends,
/// outputs, fee), so equal inputs always yield equal proofs.
pub struct MockProver<H>(PhantomData<fn() -> H>);

impl<H> MockProver<H> {
    /// Create a mock prover.
    pub fn new() -> Self {
        MockProver(PhantomData)
    }
}

impl<H> Default for MockProver<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: NodeHasher> ProofSystem for MockProver<H> {
    fn prove(&self, ctx: &ProofContext<'_>) -> Result<Proof, ProofGenerationError> {
        let mut acc = ctx.anchor;
        for spend in ctx.spends {
            acc = H::combine(0, &acc, &spend.commitment);
            let mut value = [0u8; 32];
            value[..8].copy_from_slice(&spend.value.to_le_bytes());
            value[8..16].copy_from_slice(&spend.position.to_le_bytes());
            acc = H::combine(0, &acc, &value);
        }
        for output in ctx.outputs {
            acc = H::combine(0, &acc, &output.recipient);
            let mut value = [0u8; 32];
            value[..8].copy_from_slice(&output.value.to_le_bytes());
            acc = H::combine(0, &acc, &value);
        }
        let mut fee = [0u8; 32];
        fee[..8].copy_from_slice(&ctx.fee.to_le_bytes());
        Ok(H::combine(0, &acc, &fee))
    }
}

/// Build policy knobs, injected rather than hardcoded.
#[derive(Clone, Debug)]
pub struct BuilderConfig {
    /// Maximum inputs and maximum outputs per proof step.
    pub step_capacity: usize,
    /// Flat fee charged by every proof step.
    pub step_fee: Value,
    /// Seed for deriving deterministic change commitments.
    pub change_seed: [u8; 32],
}

/// One planned step: which real notes it consumes, whether it spends the
/// previous step's change, what it emits.
#[derive(Clone, Debug, PartialEq, Eq)]
struct StepPlan {
    real_inputs: Vec<Note>,
    spends_carry: bool,
    recipients: Vec<Output>,
    change: Value,
}

/// Builds a multi-step transaction from an immutable snapshot.
pub struct TransactionBuilder<'a, H: NodeHasher> {
    snapshot: &'a BuildSnapshot<H>,
    config: &'a BuilderConfig,
}

impl<'a, H: NodeHasher> TransactionBuilder<'a, H> {
    /// Create a builder over the given snapshot.
    pub fn new(snapshot: &'a BuildSnapshot<H>, config: &'a BuilderConfig) -> Self {
        TransactionBuilder { snapshot, config }
    }

    /// Run the build: select notes, partition into steps, chain virtual
    /// change, and prove every step.
    pub fn build(
        &self,
        request: &BuildRequest,
        prover: &dyn ProofSystem,
    ) -> Result<Transaction, BuildError> {
        if request.outputs.is_empty() {
            return Ok(Transaction {
                steps: Vec::new(),
                fee_paid: 0,
            });
        }
        let plan = self.select_and_plan(&request.outputs)?;
        self.execute(&plan, prover)
    }

    /// Select the smallest prefix of spendable notes that admits a valid
    /// step partition.
    fn select_and_plan(&self, outputs: &[Output]) -> Result<Vec<StepPlan>, BuildError> {
        let notes = &self.snapshot.notes;
        let out_total: Value = outputs.iter().map(|o| o.value).sum();
        if notes.is_empty() {
            return Err(InsufficientFundsError {
                available: 0,
                required: out_total + self.config.step_fee,
            }
            .into());
        }
        let mut last_err = None;
        for take in 1..=notes.len() {
            match self.plan_with(&notes[..take], outputs) {
                Ok(plan) => return Ok(plan),
                Err(e) => last_err = Some(e),
            }
        }
        // UNWRAP: the loop above ran at least once.
        Err(last_err.unwrap().into())
    }

    /// Partition the given notes and outputs into chained steps, or fail if
    /// the notes cannot cover the outputs plus accumulated fees.
    fn plan_with(
        &self,
        notes: &[Note],
        outputs: &[Output],
    ) -> Result<Vec<StepPlan>, InsufficientFundsError> {
        let k = self.config.step_capacity;
        let fee = self.config.step_fee;
        let available: Value = notes.iter().map(|n| n.value).sum();
        let out_total: Value = outputs.iter().map(|o| o.value).sum();

        let mut remaining_notes: VecDeque<Note> = notes.iter().copied().collect();
        let mut remaining_outputs: VecDeque<Output> = outputs.iter().copied().collect();
        let mut carry: Value = 0;
        let mut have_carry = false;
        let mut steps: Vec<StepPlan> = Vec::new();

        loop {
            let insufficient = InsufficientFundsError {
                available,
                required: out_total + fee * (steps.len() as Value + 1),
            };

            let spends_carry = have_carry;
            let mut in_value = if have_carry { carry } else { 0 };
            let input_capacity = k - spends_carry as usize;
            let mut real_inputs = Vec::new();
            while real_inputs.len() < input_capacity {
                match remaining_notes.pop_front() {
                    Some(note) => {
                        in_value += note.value;
                        real_inputs.push(note);
                    }
                    None => break,
                }
            }
            if in_value < fee {
                return Err(insufficient);
            }

            // Recipient outputs are emitted only once all real inputs have
            // been gathered into the chain.
            let mut recipients = Vec::new();
            let mut out_value: Value = 0;
            if remaining_notes.is_empty() {
                while recipients.len() < k {
                    match remaining_outputs.front().copied() {
                        Some(output) if in_value >= fee + out_value + output.value => {
                            out_value += output.value;
                            remaining_outputs.pop_front();
                            recipients.push(output);
                        }
                        _ => break,
                    }
                }
            }
            let mut change = in_value - fee - out_value;
            // Change occupies an output slot of its own.
            if change > 0 && recipients.len() == k {
                // UNWRAP: recipients holds k >= 1 entries.
                let returned = recipients.pop().unwrap();
                out_value -= returned.value;
                remaining_outputs.push_front(returned);
                change = in_value - fee - out_value;
            }

            // A step that consumes no new note and pays no recipient makes
            // no progress; the chain cannot be funded.
            if real_inputs.is_empty() && recipients.is_empty() {
                return Err(insufficient);
            }

            let more = !remaining_notes.is_empty() || !remaining_outputs.is_empty();
            steps.push(StepPlan {
                real_inputs,
                spends_carry,
                recipients,
                change,
            });
            if !more {
                return Ok(steps);
            }
            if change == 0 && remaining_notes.is_empty() {
                // Outputs remain but nothing carries forward to pay them.
                return Err(InsufficientFundsError {
                    available,
                    required: out_total + fee * steps.len() as Value,
                });
            }
            have_carry = change > 0;
            carry = change;
        }
    }

    /// Prove every planned step, extending the virtual tree with each
    /// intermediate change note.
    fn execute(
        &self,
        plan: &[StepPlan],
        prover: &dyn ProofSystem,
    ) -> Result<Transaction, BuildError> {
        let base = &self.snapshot.checkpoint;
        let base_anchor = base.anchor();
        let mut virtual_tree = base.tree.clone();

        // Witnesses for every selected real note, folded forward with each
        // virtual change leaf so all inputs of a step share its anchor.
        let mut real_witnesses: HashMap<Position, IncrementalWitness<H>> = HashMap::new();
        for step in plan {
            for note in &step.real_inputs {
                let witness = base.witnesses.get(&note.position).ok_or(StaleWitnessError {
                    requested_height: base.height,
                    oldest_retained: None,
                })?;
                real_witnesses.insert(note.position, witness.clone());
            }
        }

        let mut carry: Option<(Commitment, Value, IncrementalWitness<H>)> = None;
        let mut steps = Vec::with_capacity(plan.len());
        let mut fee_paid = 0;

        for (index, step) in plan.iter().enumerate() {
            let step_anchor = if index == 0 {
                StepAnchor::Real(base_anchor)
            } else {
                StepAnchor::Virtual(virtual_tree.anchor())
            };

            let mut spends = Vec::new();
            if step.spends_carry {
                // UNWRAP: the plan only sets `spends_carry` when the prior
                // step produced change.
                let (commitment, value, witness) = carry.take().unwrap();
                spends.push(SpendDescription {
                    position: witness.position(),
                    commitment,
                    value,
                    auth_path: witness.auth_path(),
                });
            }
            for note in &step.real_inputs {
                // UNWRAP: populated for every planned note above.
                let witness = real_witnesses.get(&note.position).unwrap();
                spends.push(SpendDescription {
                    position: note.position,
                    commitment: note.commitment,
                    value: note.value,
                    auth_path: witness.auth_path(),
                });
            }

            // Every input of the step must witness exactly the step anchor.
            for spend in &spends {
                let root = spend.auth_path.root::<H>(&spend.commitment);
                if root != step_anchor.root() {
                    return Err(AnchorMismatchError {
                        expected: step_anchor.root(),
                        found: root,
                    }
                    .into());
                }
            }

            let proof = prover.prove(&ProofContext {
                anchor: step_anchor.root(),
                spends: &spends,
                outputs: &step.recipients,
                fee: self.config.step_fee,
            })?;
            fee_paid += self.config.step_fee;

            if step.change > 0 {
                let commitment =
                    derive_commitment::<H>(&self.config.change_seed, index as u64, step.change);
                for witness in real_witnesses.values_mut() {
                    witness.append(commitment)?;
                }
                virtual_tree.append(commitment)?;
                let witness = IncrementalWitness::from_tree(virtual_tree.clone());
                carry = Some((commitment, step.change, witness));
            }

            steps.push(ProofStep {
                anchor: step_anchor,
                spends,
                outputs: step.recipients.clone(),
                change: step.change,
                proof,
            });
        }

        Ok(Transaction { steps, fee_paid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::WitnessTracker;
    use treestate_core::hasher::Blake3Hasher;

    const FEE: Value = 1000;

    fn config() -> BuilderConfig {
        BuilderConfig {
            step_capacity: 2,
            step_fee: FEE,
            change_seed: [7u8; 32],
        }
    }

    fn out(tag: u8, value: Value) -> Output {
        Output::new([tag; 32], value)
    }

    /// Mint `values.len()` tracked notes, one block each, and capture a
    /// snapshot at the final height.
    fn snapshot(values: &[Value]) -> BuildSnapshot<Blake3Hasher> {
        let mut tracker = WitnessTracker::new(100);
        for (i, value) in values.iter().enumerate() {
            tracker.append([i as u8 + 1; 32]).unwrap();
            tracker.track_latest(*value).unwrap();
            tracker.checkpoint(i as u64 + 1);
        }
        BuildSnapshot {
            checkpoint: tracker.latest_checkpoint().clone(),
            notes: tracker.spendable_notes(),
        }
    }

    #[test]
    fn single_step_when_capacity_suffices() {
        let snap = snapshot(&[9000, 9000]);
        let cfg = config();
        let builder = TransactionBuilder::new(&snap, &cfg);
        let tx = builder
            .build(
                &BuildRequest {
                    outputs: vec![out(1, 17000)],
                },
                &MockProver::<Blake3Hasher>::new(),
            )
            .unwrap();
        assert_eq!(tx.steps.len(), 1);
        assert_eq!(tx.fee_paid, FEE);
        assert!(matches!(tx.steps[0].anchor, StepAnchor::Real(_)));
        assert_eq!(tx.steps[0].change, 0);
        assert_eq!(tx.spent_positions(), vec![0, 1]);
    }

    #[test]
    fn three_notes_chain_into_two_steps() {
        let snap = snapshot(&[9000, 9000, 9000]);
        let cfg = config();
        let builder = TransactionBuilder::new(&snap, &cfg);
        let tx = builder
            .build(
                &BuildRequest {
                    outputs: vec![out(1, 17000), out(2, 8000)],
                },
                &MockProver::<Blake3Hasher>::new(),
            )
            .unwrap();

        assert_eq!(tx.steps.len(), 2);
        assert_eq!(tx.fee_paid, 2 * FEE);

        let first = &tx.steps[0];
        assert_eq!(first.anchor, StepAnchor::Real(snap.checkpoint.anchor()));
        assert_eq!(first.spends.len(), 2);
        assert!(first.outputs.is_empty());
        assert_eq!(first.change, 17000);

        let second = &tx.steps[1];
        assert!(second.anchor.is_virtual());
        assert_ne!(second.anchor.root(), first.anchor.root());
        assert_eq!(second.spends.len(), 2);
        assert_eq!(second.outputs.len(), 2);
        assert_eq!(second.change, 0);

        // Every spend verifies against its own step's anchor.
        for step in &tx.steps {
            for spend in &step.spends {
                assert_eq!(
                    spend.auth_path.root::<Blake3Hasher>(&spend.commitment),
                    step.anchor.root()
                );
            }
        }
        assert_eq!(tx.spent_positions(), vec![0, 1, 2]);
    }

    #[test]
    fn outputs_beyond_capacity_chain_further_steps() {
        let snap = snapshot(&[50000]);
        let cfg = config();
        let builder = TransactionBuilder::new(&snap, &cfg);
        let tx = builder
            .build(
                &BuildRequest {
                    outputs: vec![out(1, 10000), out(2, 10000), out(3, 10000)],
                },
                &MockProver::<Blake3Hasher>::new(),
            )
            .unwrap();
        assert_eq!(tx.steps.len(), 3);
        let emitted: Value = tx
            .steps
            .iter()
            .flat_map(|s| s.outputs.iter())
            .map(|o| o.value)
            .sum();
        assert_eq!(emitted, 30000);
        // Residual change stays with the final step.
        assert_eq!(tx.steps[2].change, 50000 - 30000 - 3 * FEE);
    }

    #[test]
    fn insufficient_funds_is_detected_without_proving() {
        struct PanicProver;
        impl ProofSystem for PanicProver {
            fn prove(&self, _: &ProofContext<'_>) -> Result<Proof, ProofGenerationError> {
                panic!("plan failures must not reach the prover");
            }
        }

        let snap = snapshot(&[9000, 9000, 9000]);
        let cfg = config();
        let builder = TransactionBuilder::new(&snap, &cfg);
        let err = builder
            .build(
                &BuildRequest {
                    outputs: vec![out(1, 27000)],
                },
                &PanicProver,
            )
            .unwrap_err();
        match err {
            BuildError::InsufficientFunds(e) => assert_eq!(e.available, 27000),
            other => panic!("expected insufficient funds, got {other:?}"),
        }
    }

    #[test]
    fn tampered_witness_aborts_with_anchor_mismatch() {
        let mut snap = snapshot(&[9000, 9000, 9000]);
        // Fold a leaf the tree never saw into one witness; its root now
        // disagrees with the captured anchor.
        snap.checkpoint
            .witnesses
            .get_mut(&0)
            .unwrap()
            .append([0xAA; 32])
            .unwrap();
        let cfg = config();
        let builder = TransactionBuilder::new(&snap, &cfg);
        let err = builder
            .build(
                &BuildRequest {
                    outputs: vec![out(1, 17000), out(2, 8000)],
                },
                &MockProver::<Blake3Hasher>::new(),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::AnchorMismatch(_)));
    }

    #[test]
    fn empty_request_builds_nothing() {
        let snap = snapshot(&[9000]);
        let cfg = config();
        let builder = TransactionBuilder::new(&snap, &cfg);
        let tx = builder
            .build(
                &BuildRequest { outputs: vec![] },
                &MockProver::<Blake3Hasher>::new(),
            )
            .unwrap();
        assert!(tx.steps.is_empty());
        assert_eq!(tx.fee_paid, 0);
    }
}
