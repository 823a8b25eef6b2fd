//! Witnesses and anchors expire once their checkpoint leaves the retention
//! window; live heights keep serving consistent paths.

mod common;

use common::{cm, open};
use treestate::hasher::Blake3Hasher;
use treestate::BlockEntry;

#[test]
fn witnesses_expire_with_their_checkpoints() {
    let ts = open(100);

    // A note minted at height 1, then a long run of foreign blocks.
    ts.connect_block(1, &[BlockEntry::retained(cm(1), 700)])
        .unwrap();
    let early_anchor = ts.current_anchor();
    for height in 2..=150u64 {
        ts.connect_block(height, &[BlockEntry::new(cm(height))])
            .unwrap();
    }

    // Retained checkpoints are heights 51-150.
    let stale = ts.witness_at(0, 1).unwrap_err();
    assert_eq!(stale.requested_height, 1);
    assert_eq!(stale.oldest_retained, Some(51));
    assert!(ts.witness_at(0, 50).is_err());
    assert!(!ts.is_valid_anchor(&early_anchor.root));

    // Heights inside the window still serve the note's path, each consistent
    // with the root published at that height.
    for height in [51u64, 100, 150] {
        let path = ts.witness_at(0, height).unwrap();
        assert_eq!(path.tree_size, height);
        let root = path.root::<Blake3Hasher>(&cm(1));
        assert!(ts.is_valid_anchor(&root));
    }
    assert_eq!(
        ts.witness_at(0, 150).unwrap().root::<Blake3Hasher>(&cm(1)),
        ts.current_anchor().root
    );

    // The live witness never expires while the note is tracked.
    assert!(ts.witness_snapshot(0).is_some());
}
