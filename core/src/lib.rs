//! Core operations and types of the treestate note-commitment tree.
//!
//! This crate defines the fixed-depth, append-only commitment tree, its
//! incremental frontier representation, and the per-note witness structure
//! that keeps an authentication path current as new commitments are appended,
//! all generalized over a 256 bit hash function.
//!
//! The tree and witness routines of this crate do not require the standard
//! library, but do require Rust's alloc crate.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod hasher;
pub mod tree;
pub mod witness;

pub use tree::{Anchor, Commitment, CommitmentTree, Node, Position, TreeFull, TREE_DEPTH};
pub use witness::{AuthPath, IncrementalWitness};
