//! Errors and their operational classification.

use super::expression::ExpressionError;
use super::ids::{ReplicaId, RseId};
use super::pfn::PfnError;
use super::replica::ReplicaState;

/// Operational class of an error; decides whether it is retried, surfaced
/// or fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad startup input. Fatal, never retried.
    Configuration,
    /// Retried on a later cycle.
    Transient,
    /// Terminal for the affected replica; needs an operator.
    Permanent,
    /// Broken invariant inside the engine.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid rse expression: {0}")]
    Expression(#[from] ExpressionError),

    #[error("unknown rse '{0}'")]
    UnknownRse(RseId),

    #[error("replica {replica} cannot move from {from} to {to}")]
    InvalidTransition {
        replica: ReplicaId,
        from: ReplicaState,
        to: ReplicaState,
    },

    #[error("replica {0} not found in catalog")]
    ReplicaNotFound(ReplicaId),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error(transparent)]
    Pfn(#[from] PfnError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReaperError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaperError::Configuration(_)
            | ReaperError::Expression(_)
            | ReaperError::UnknownRse(_) => ErrorKind::Configuration,
            ReaperError::Catalog(_) => ErrorKind::Transient,
            ReaperError::InvalidTransition { .. }
            | ReaperError::ReplicaNotFound(_)
            | ReaperError::Pfn(_) => ErrorKind::Permanent,
            ReaperError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Internal)
    }
}
