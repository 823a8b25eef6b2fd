//! Build failures are terminal, reported verbatim, and leave no side
//! effects on tracked state.

mod common;

use std::sync::Arc;

use common::{mint_notes, open, open_with};
use treestate::{
    BuildError, BuildRequest, OperationStatus, Output, Proof, ProofContext, ProofGenerationError,
    ProofSystem,
};

struct FailingProver;

impl ProofSystem for FailingProver {
    fn prove(&self, _: &ProofContext<'_>) -> Result<Proof, ProofGenerationError> {
        Err(ProofGenerationError("constraint system unsatisfied".into()))
    }
}

#[test]
fn insufficient_funds_leaves_state_untouched() {
    let ts = open(100);
    mint_notes(&ts, &[9000, 9000, 9000]);
    let anchor = ts.current_anchor();

    let id = ts.submit_build(BuildRequest {
        outputs: vec![Output::new([1; 32], 27000)],
    });
    let status = ts.wait_operation(&id).unwrap();
    match &status {
        OperationStatus::Failed(BuildError::InsufficientFunds(e)) => {
            assert_eq!(e.available, 27000);
            assert!(e.required > 27000);
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }

    // Nothing was spent, appended, or re-anchored.
    assert_eq!(ts.spendable_value(), 27000);
    assert_eq!(ts.current_anchor(), anchor);
    assert_eq!(ts.spendable_notes().len(), 3);

    // The failure is reported verbatim on every later query.
    assert_eq!(ts.query_status(&id).unwrap(), status);
}

#[test]
fn prover_failures_surface_as_terminal_status() {
    let ts = open_with(100, Some(Arc::new(FailingProver)));
    mint_notes(&ts, &[9000, 9000]);

    let id = ts.submit_build(BuildRequest {
        outputs: vec![Output::new([1; 32], 5000)],
    });
    match ts.wait_operation(&id).unwrap() {
        OperationStatus::Failed(BuildError::ProofGeneration(e)) => {
            assert_eq!(e.0, "constraint system unsatisfied");
        }
        other => panic!("expected proof generation failure, got {other:?}"),
    }
    // A failed build spends nothing.
    assert_eq!(ts.spendable_value(), 18000);
}

#[test]
fn unknown_operations_are_none() {
    let ts = open(100);
    let id = ts.submit_build(BuildRequest { outputs: vec![] });
    ts.wait_operation(&id).unwrap();

    let other = open(100);
    // An identifier issued by a different instance is unknown here.
    assert_eq!(other.query_status(&id), None);
    assert_eq!(other.wait_operation(&id), None);
}

#[test]
fn empty_requests_succeed_with_no_steps() {
    let ts = open(100);
    mint_notes(&ts, &[9000]);
    let id = ts.submit_build(BuildRequest { outputs: vec![] });
    match ts.wait_operation(&id).unwrap() {
        OperationStatus::Success(tx) => {
            assert!(tx.steps.is_empty());
            assert_eq!(tx.fee_paid, 0);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(ts.spendable_value(), 9000);
}
