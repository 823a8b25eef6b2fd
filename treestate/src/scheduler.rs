//! Asynchronous scheduling of transaction builds.
//!
//! Submissions return an operation identifier immediately; the build itself
//! runs on a worker pool. Status moves through `Queued` and `Executing` to
//! exactly one terminal state, which never changes afterwards and is
//! reported verbatim on every subsequent query.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use rand::Rng;
use threadpool::ThreadPool;

use crate::builder::Transaction;
use crate::errors::BuildError;

/// Opaque handle to a submitted operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    fn generate() -> Self {
        let token: u64 = rand::thread_rng().gen();
        OperationId(format!("opid-{:016x}", token))
    }

    /// The identifier as a string, for logging and external callers.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The lifecycle state of a submitted operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    /// Accepted, not yet picked up by a worker.
    Queued,
    /// A worker is building the transaction.
    Executing,
    /// Terminal: the build finished and produced a transaction.
    Success(Transaction),
    /// Terminal: the build failed.
    Failed(BuildError),
}

impl OperationStatus {
    /// Whether this status will never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success(_) | OperationStatus::Failed(_))
    }
}

struct Slot {
    status: OperationStatus,
    // Dropped when a terminal status is recorded; waiters observe the
    // disconnect. Never sent on.
    done_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
}

/// Runs builds on a bounded worker pool and records per-operation status.
pub struct OperationScheduler {
    pool: ThreadPool,
    slots: Arc<DashMap<OperationId, Slot>>,
}

impl OperationScheduler {
    /// Create a scheduler with the given number of build workers.
    pub fn new(workers: usize) -> Self {
        OperationScheduler {
            pool: ThreadPool::new(workers.max(1)),
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Queue a build job. The returned identifier is immediately queryable
    /// with status `Queued`.
    pub fn submit<F>(&self, job: F) -> OperationId
    where
        F: FnOnce() -> Result<Transaction, BuildError> + Send + 'static,
    {
        let id = OperationId::generate();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.slots.insert(
            id.clone(),
            Slot {
                status: OperationStatus::Queued,
                done_tx: Some(done_tx),
                done_rx,
            },
        );
        log::debug!("queued operation {}", id);

        let slots = self.slots.clone();
        let worker_id = id.clone();
        self.pool.execute(move || {
            if let Some(mut slot) = slots.get_mut(&worker_id) {
                slot.status = OperationStatus::Executing;
            }
            let outcome = match job() {
                Ok(tx) => OperationStatus::Success(tx),
                Err(e) => {
                    log::warn!("operation {} failed: {}", worker_id, e);
                    OperationStatus::Failed(e)
                }
            };
            if let Some(mut slot) = slots.get_mut(&worker_id) {
                slot.status = outcome;
                // Closing the channel wakes every waiter at once.
                slot.done_tx = None;
            }
        });
        id
    }

    /// The current status of an operation, or `None` for an unknown
    /// identifier.
    pub fn status(&self, id: &OperationId) -> Option<OperationStatus> {
        self.slots.get(id).map(|slot| slot.status.clone())
    }

    /// Block until the operation reaches a terminal status and return it.
    /// Returns `None` for an unknown identifier.
    pub fn wait_terminal(&self, id: &OperationId) -> Option<OperationStatus> {
        let done_rx = {
            let slot = self.slots.get(id)?;
            if slot.status.is_terminal() {
                return Some(slot.status.clone());
            }
            slot.done_rx.clone()
        };
        // Disconnects exactly once, when a terminal status is recorded.
        let _ = done_rx.recv();
        self.slots.get(id).map(|slot| slot.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProofGenerationError;

    #[test]
    fn success_is_terminal_and_stable() {
        let sched = OperationScheduler::new(2);
        let id = sched.submit(|| {
            Ok(Transaction {
                steps: vec![],
                fee_paid: 0,
            })
        });
        let status = sched.wait_terminal(&id).unwrap();
        assert!(matches!(status, OperationStatus::Success(_)));
        // Querying again reports the identical terminal status.
        assert_eq!(sched.status(&id).unwrap(), status);
        assert_eq!(sched.wait_terminal(&id).unwrap(), status);
    }

    #[test]
    fn failures_are_reported_verbatim() {
        let sched = OperationScheduler::new(1);
        let id = sched.submit(|| {
            Err(BuildError::ProofGeneration(ProofGenerationError(
                "constraint system unsatisfied".into(),
            )))
        });
        match sched.wait_terminal(&id).unwrap() {
            OperationStatus::Failed(BuildError::ProofGeneration(e)) => {
                assert_eq!(e.0, "constraint system unsatisfied");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn unknown_ids_resolve_to_none() {
        let sched = OperationScheduler::new(1);
        let bogus = OperationId("opid-0000000000000000".into());
        assert_eq!(sched.status(&bogus), None);
        assert_eq!(sched.wait_terminal(&bogus), None);
    }

    #[test]
    fn operations_run_concurrently_with_submission() {
        let sched = OperationScheduler::new(2);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let slow = sched.submit(move || {
            gate_rx.recv().ok();
            Ok(Transaction {
                steps: vec![],
                fee_paid: 0,
            })
        });
        // The slow job has not finished; its status is non-terminal.
        let status = sched.status(&slow).unwrap();
        assert!(!status.is_terminal());
        gate_tx.send(()).unwrap();
        assert!(sched.wait_terminal(&slow).unwrap().is_terminal());
    }
}
