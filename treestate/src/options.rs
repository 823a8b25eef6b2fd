use std::sync::Arc;

use crate::builder::ProofSystem;
use crate::note::Value;

/// Options when opening a [`crate::TreeState`] instance.
pub struct Options {
    /// The number of checkpoints retained for rollback and stale-anchor
    /// validation.
    pub(crate) retention_window: usize,
    /// Maximum inputs and maximum outputs per proof step.
    pub(crate) step_capacity: usize,
    /// Flat fee charged by every proof step.
    pub(crate) step_fee: Value,
    /// The number of worker threads executing build operations.
    pub(crate) build_workers: usize,
    pub(crate) change_seed: [u8; 32],
    pub(crate) proof_system: Option<Arc<dyn ProofSystem>>,
}

impl Options {
    /// Create a new `Options` instance with the default values and a random
    /// change seed.
    pub fn new() -> Self {
        use rand::Rng as _;
        let mut change_seed = [0u8; 32];
        rand::rngs::OsRng.fill(&mut change_seed);

        Self {
            retention_window: 100,
            step_capacity: 2,
            step_fee: 1000,
            build_workers: 2,
            change_seed,
            proof_system: None,
        }
    }

    /// Set the number of checkpoints retained.
    ///
    /// Rollback targets and witness queries older than this window fail.
    ///
    /// May not be zero. Default: 100.
    pub fn retention_window(&mut self, retention_window: usize) {
        self.retention_window = retention_window;
    }

    /// Set the maximum number of inputs (and of outputs) per proof step.
    ///
    /// Must be at least 2, or chained steps cannot carry change forward
    /// alongside a fresh input.
    pub fn step_capacity(&mut self, step_capacity: usize) {
        self.step_capacity = step_capacity;
    }

    /// Set the flat fee charged by every proof step.
    ///
    /// Default: 1000.
    pub fn step_fee(&mut self, step_fee: Value) {
        self.step_fee = step_fee;
    }

    /// Set the number of worker threads executing build operations.
    ///
    /// Must be more than 0.
    pub fn build_workers(&mut self, build_workers: usize) {
        assert!(build_workers > 0);
        self.build_workers = build_workers;
    }

    /// Set the seed used to derive change-note commitments.
    ///
    /// Useful for reproducibility.
    pub fn change_seed(&mut self, change_seed: [u8; 32]) {
        self.change_seed = change_seed;
    }

    /// Set the proving backend used for build operations.
    ///
    /// Default: a deterministic mock prover.
    pub fn proof_system(&mut self, proof_system: Arc<dyn ProofSystem>) {
        self.proof_system = Some(proof_system);
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
