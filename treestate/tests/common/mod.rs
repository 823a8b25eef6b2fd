//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use treestate::hasher::Blake3Hasher;
use treestate::{BlockEntry, Commitment, Options, ProofSystem, TreeState};

pub const SEED: [u8; 32] = [0x42; 32];
pub const FEE: u64 = 1000;

/// A deterministic test commitment.
pub fn cm(i: u64) -> Commitment {
    let mut c = [0u8; 32];
    c[..8].copy_from_slice(&i.to_le_bytes());
    c[31] = 0xCC;
    c
}

/// Open a treestate with deterministic policy knobs.
pub fn open_with(
    retention: usize,
    prover: Option<Arc<dyn ProofSystem>>,
) -> TreeState<Blake3Hasher> {
    let mut o = Options::new();
    o.retention_window(retention);
    o.step_capacity(2);
    o.step_fee(FEE);
    o.build_workers(2);
    o.change_seed(SEED);
    if let Some(prover) = prover {
        o.proof_system(prover);
    }
    TreeState::open(o).unwrap()
}

pub fn open(retention: usize) -> TreeState<Blake3Hasher> {
    open_with(retention, None)
}

/// Connect one block per value, each minting a single retained note.
pub fn mint_notes(ts: &TreeState<Blake3Hasher>, values: &[u64]) {
    for (i, value) in values.iter().enumerate() {
        let height = i as u64 + 1;
        ts.connect_block(height, &[BlockEntry::retained(cm(height), *value)])
            .unwrap();
    }
}
