//! Error taxonomy of the treestate service.
//!
//! Block-acceptance errors never propagate into in-flight builds; a build
//! only ever observes the snapshot it captured. Build failures are terminal
//! and reported verbatim through status queries.

use std::fmt;

pub use treestate_core::TreeFull;

use treestate_core::{Node, Position};

/// A witness was requested for a checkpoint height that has fallen outside
/// the retention window, or for a note that was not tracked at that height.
///
/// Recoverable: the caller may re-select notes against a newer checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleWitnessError {
    /// The height the witness was requested at.
    pub requested_height: u64,
    /// The oldest height still retained, if any.
    pub oldest_retained: Option<u64>,
}

impl fmt::Display for StaleWitnessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.oldest_retained {
            Some(oldest) => write!(
                f,
                "witness requested at height {} but retention begins at height {}",
                self.requested_height, oldest
            ),
            None => write!(
                f,
                "witness requested at height {} with no retained checkpoints",
                self.requested_height
            ),
        }
    }
}

impl std::error::Error for StaleWitnessError {}

/// A rollback was requested to a height that predates the retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackUnsupportedError {
    /// The height the rollback targeted.
    pub requested_height: u64,
    /// The oldest height still retained, if any.
    pub oldest_retained: Option<u64>,
}

impl fmt::Display for RollbackUnsupportedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cannot roll back to height {}: retention begins at height {:?}",
            self.requested_height, self.oldest_retained
        )
    }
}

impl std::error::Error for RollbackUnsupportedError {}

/// The available notes cannot cover the requested outputs plus fees.
///
/// User-facing and never retried; raising it has no tree or witness side
/// effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientFundsError {
    /// Total value of the notes available for spending.
    pub available: u64,
    /// Total value required, including per-step fees.
    pub required: u64,
}

impl fmt::Display for InsufficientFundsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "insufficient funds: have {}, need {} (including fees)",
            self.available, self.required
        )
    }
}

impl std::error::Error for InsufficientFundsError {}

/// A proof step's selected inputs do not agree on a single anchor.
///
/// This signals a correctness bug in witness maintenance: the build is
/// aborted, never repaired or silently re-anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorMismatchError {
    /// The anchor root the step was scoped to.
    pub expected: Node,
    /// The root implied by the disagreeing witness.
    pub found: Node,
}

impl fmt::Display for AnchorMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "witness for spendable note does not have the step anchor: expected {}, found {}",
            hex::encode_upper(&self.expected[..4]),
            hex::encode_upper(&self.found[..4]),
        )
    }
}

impl std::error::Error for AnchorMismatchError {}

/// Opaque failure surfaced by the proving backend. Not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofGenerationError(pub String);

impl fmt::Display for ProofGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "proof generation failed: {}", self.0)
    }
}

impl std::error::Error for ProofGenerationError {}

/// A note was passed to `track` whose position is not the most recently
/// appended leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackError {
    /// The position of the offered note.
    pub position: Position,
    /// The current tree size.
    pub tree_size: u64,
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "can only begin tracking the most recently appended leaf: \
             note position {}, tree size {}",
            self.position, self.tree_size
        )
    }
}

impl std::error::Error for TrackError {}

/// Any failure terminating a transaction build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// See [`InsufficientFundsError`].
    InsufficientFunds(InsufficientFundsError),
    /// See [`AnchorMismatchError`].
    AnchorMismatch(AnchorMismatchError),
    /// See [`ProofGenerationError`].
    ProofGeneration(ProofGenerationError),
    /// See [`StaleWitnessError`].
    StaleWitness(StaleWitnessError),
    /// The virtual tree extension ran out of capacity.
    TreeFull(TreeFull),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuildError::InsufficientFunds(e) => e.fmt(f),
            BuildError::AnchorMismatch(e) => e.fmt(f),
            BuildError::ProofGeneration(e) => e.fmt(f),
            BuildError::StaleWitness(e) => e.fmt(f),
            BuildError::TreeFull(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<InsufficientFundsError> for BuildError {
    fn from(e: InsufficientFundsError) -> Self {
        BuildError::InsufficientFunds(e)
    }
}

impl From<AnchorMismatchError> for BuildError {
    fn from(e: AnchorMismatchError) -> Self {
        BuildError::AnchorMismatch(e)
    }
}

impl From<ProofGenerationError> for BuildError {
    fn from(e: ProofGenerationError) -> Self {
        BuildError::ProofGeneration(e)
    }
}

impl From<StaleWitnessError> for BuildError {
    fn from(e: StaleWitnessError) -> Self {
        BuildError::StaleWitness(e)
    }
}

impl From<TreeFull> for BuildError {
    fn from(e: TreeFull) -> Self {
        BuildError::TreeFull(e)
    }
}
