//! Rollback restores checkpointed state exactly; replaying the same blocks
//! reproduces the same anchors and witnesses.

mod common;

use common::{cm, open};
use treestate::{Anchor, AuthPath, BlockEntry};

#[test]
fn replay_after_rollback_is_deterministic() {
    let ts = open(100);

    let mut anchors: Vec<Anchor> = Vec::new();
    let mut paths: Vec<AuthPath> = Vec::new();
    for height in 1..=5u64 {
        ts.connect_block(height, &[BlockEntry::retained(cm(height), height * 100)])
            .unwrap();
        anchors.push(ts.current_anchor());
        paths.push(ts.witness_snapshot(0).unwrap());
    }

    ts.rollback_to(2).unwrap();
    assert_eq!(ts.current_anchor(), anchors[1]);
    assert_eq!(ts.witness_snapshot(0).unwrap(), paths[1]);
    assert_eq!(ts.spendable_value(), 100 + 200);

    // Reconnecting the identical blocks recreates the identical state.
    for height in 3..=5u64 {
        ts.connect_block(height, &[BlockEntry::retained(cm(height), height * 100)])
            .unwrap();
        assert_eq!(ts.current_anchor(), anchors[height as usize - 1]);
        assert_eq!(ts.witness_snapshot(0).unwrap(), paths[height as usize - 1]);
    }
    assert_eq!(ts.spendable_value(), (1..=5).map(|h| h * 100).sum::<u64>());
}

#[test]
fn disconnect_restores_the_previous_height() {
    let ts = open(100);
    ts.connect_block(1, &[BlockEntry::retained(cm(1), 100)])
        .unwrap();
    let before = ts.current_anchor();
    ts.connect_block(2, &[BlockEntry::retained(cm(2), 200)])
        .unwrap();

    ts.disconnect_block(2).unwrap();
    assert_eq!(ts.current_anchor(), before);
    // The note minted in the disconnected block is gone entirely.
    assert!(ts.witness_snapshot(1).is_none());
    assert_eq!(ts.spendable_value(), 100);
}

#[test]
fn rollback_beyond_retention_is_refused() {
    let ts = open(3);
    for height in 1..=6u64 {
        ts.connect_block(height, &[BlockEntry::new(cm(height))])
            .unwrap();
    }
    // Retained checkpoints are heights 4-6.
    let err = ts.rollback_to(2).unwrap_err();
    assert_eq!(err.requested_height, 2);
    assert_eq!(err.oldest_retained, Some(4));
    // The refused rollback left the state untouched.
    ts.rollback_to(4).unwrap();
}
