//! Domain model (IDs, endpoints, replicas, outcomes, errors).
//!
//! Nothing in here performs I/O; the ports and the app layer do.

pub mod batch;
pub mod decision;
pub mod errors;
pub mod expression;
pub mod ids;
pub mod outcome;
pub mod pfn;
pub mod replica;
pub mod rse;

pub use self::batch::DeletionBatch;
pub use self::decision::{BatchVerdict, Reconciliation, batch_verdict, reconcile};
pub use self::errors::{ErrorKind, ReaperError};
pub use self::expression::{ExpressionError, RseExpression};
pub use self::ids::{BatchId, ReplicaId, RseId};
pub use self::outcome::{DeletionOutcome, FailureKind};
pub use self::pfn::{Pfn, PfnError};
pub use self::replica::{Replica, ReplicaState};
pub use self::rse::{DEFAULT_VO, Protocol, Rse};
