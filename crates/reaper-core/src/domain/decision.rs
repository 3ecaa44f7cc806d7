//! Decision model: what to write back to the catalog for one outcome.
//!
//! Pure functions only. The executor carries out the decision; keeping the
//! mapping here means the outcome → catalog rule is tested in one place.

use super::outcome::{DeletionOutcome, FailureKind};

/// Catalog write for one deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// `confirm_deleted`: replica reaches DELETED.
    ConfirmDeleted,

    /// `mark_failed(kind)`: replica keeps its claim (transient) or
    /// becomes DELETION_FAILED (permanent).
    MarkFailed { kind: FailureKind, reason: String },
}

pub fn reconcile(outcome: &DeletionOutcome) -> Reconciliation {
    match outcome {
        DeletionOutcome::Deleted => Reconciliation::ConfirmDeleted,
        DeletionOutcome::TransientFailure(reason) => Reconciliation::MarkFailed {
            kind: FailureKind::Transient,
            reason: reason.clone(),
        },
        DeletionOutcome::PermanentFailure(reason) => Reconciliation::MarkFailed {
            kind: FailureKind::Permanent,
            reason: reason.clone(),
        },
    }
}

/// Endpoint-level event derived from a whole batch.
///
/// Batch granularity: one correlated outage that fails fifty files is one
/// failure, not fifty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    Success,
    Failure,
}

pub fn batch_verdict<'a>(outcomes: impl IntoIterator<Item = &'a DeletionOutcome>) -> BatchVerdict {
    if outcomes.into_iter().all(DeletionOutcome::is_success) {
        BatchVerdict::Success
    } else {
        BatchVerdict::Failure
    }
}
