//! Outcome model: what a deletion driver reports for one PFN.
//!
//! Drivers never return `Err` for a per-file problem; they classify it into
//! one of the three outcomes so that one bad file cannot abort a batch.

use serde::{Deserialize, Serialize};

/// Failure classification recorded in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Network, timeout, endpoint busy: retried after delay-seconds.
    Transient,
    /// The endpoint refuses for good: terminal, surfaced to operators.
    Permanent,
}

/// Result of one `delete(pfn)` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionOutcome {
    /// Removal confirmed, or the file was already gone.
    Deleted,
    TransientFailure(String),
    PermanentFailure(String),
}

impl DeletionOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentFailure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeletionOutcome::Deleted)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DeletionOutcome::Deleted => None,
            DeletionOutcome::TransientFailure(_) => Some(FailureKind::Transient),
            DeletionOutcome::PermanentFailure(_) => Some(FailureKind::Permanent),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DeletionOutcome::Deleted => None,
            DeletionOutcome::TransientFailure(r) | DeletionOutcome::PermanentFailure(r) => {
                Some(r.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_tagged_enum() {
        let o = DeletionOutcome::transient("connection reset");
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["kind"], "TRANSIENT_FAILURE");
        assert_eq!(v["reason"], "connection reset");

        let v = serde_json::to_value(DeletionOutcome::Deleted).unwrap();
        assert_eq!(v["kind"], "DELETED");
    }

    #[test]
    fn failure_kind_follows_variant() {
        assert_eq!(DeletionOutcome::Deleted.failure_kind(), None);
        assert_eq!(
            DeletionOutcome::permanent("EACCES").failure_kind(),
            Some(FailureKind::Permanent)
        );
        assert_eq!(DeletionOutcome::permanent("EACCES").reason(), Some("EACCES"));
        assert!(DeletionOutcome::Deleted.is_success());
    }
}
