//! Notes and note-commitment derivation.

use treestate_core::hasher::NodeHasher;
use treestate_core::{Commitment, Position};

/// A note value, in the smallest unit.
pub type Value = u64;

/// A shielded note of interest to the wallet.
///
/// Immutable once created: the commitment and position never change, and the
/// note exists until it is spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    /// The commitment stored as the tree leaf at `position`.
    pub commitment: Commitment,
    /// The value carried by the note.
    pub value: Value,
    /// The leaf position of the commitment in the global tree.
    pub position: Position,
}

/// A requested output of a transaction build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Output {
    /// Opaque recipient identifier.
    pub recipient: [u8; 32],
    /// The value to send.
    pub value: Value,
}

impl Output {
    /// Convenience constructor.
    pub fn new(recipient: [u8; 32], value: Value) -> Self {
        Output { recipient, value }
    }
}

/// Derive a deterministic note commitment from a seed, a disambiguating tag,
/// and the note value.
///
/// This stands in for the full note-commitment computation, which is part of
/// the proving system proper; what matters here is that the result is a
/// deterministic, collision-resistant function of its inputs, so change
/// commitments minted during a build are reproducible.
pub fn derive_commitment<H: NodeHasher>(seed: &[u8; 32], tag: u64, value: Value) -> Commitment {
    let mut data = [0u8; 32];
    data[..8].copy_from_slice(&value.to_le_bytes());
    data[8..16].copy_from_slice(&tag.to_le_bytes());
    H::combine(0, seed, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use treestate_core::hasher::Blake3Hasher;

    #[test]
    fn commitment_derivation_is_deterministic() {
        let seed = [7u8; 32];
        let a = derive_commitment::<Blake3Hasher>(&seed, 0, 1000);
        let b = derive_commitment::<Blake3Hasher>(&seed, 0, 1000);
        assert_eq!(a, b);
        assert_ne!(a, derive_commitment::<Blake3Hasher>(&seed, 1, 1000));
        assert_ne!(a, derive_commitment::<Blake3Hasher>(&seed, 0, 1001));
        assert_ne!(a, derive_commitment::<Blake3Hasher>(&[8u8; 32], 0, 1000));
    }
}
