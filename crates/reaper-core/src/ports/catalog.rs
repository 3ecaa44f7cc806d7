//! Catalog port - the shared source of truth for endpoints and replicas.
//!
//! The reaper never owns replica state. Every claim and every outcome is an
//! atomic read-modify call against the catalog, which is what makes two
//! daemons (or two workers) safe to run against the same endpoints.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::{FailureKind, ReaperError, Replica, ReplicaId, Rse, RseId};

/// Parameters of one `fetch_candidates` call.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub rse_id: RseId,

    /// At most this many replicas are returned (chunk-size).
    pub limit: usize,

    /// Only replicas whose PFN uses this scheme.
    pub scheme: Option<String>,

    /// A BEING_DELETED claim older than this may be taken over.
    pub delay: Duration,

    /// Ignore the catalog's minimum tombstone age.
    pub greedy: bool,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// All configured endpoints.
    async fn list_rses(&self) -> Result<Vec<Rse>, ReaperError>;

    /// Claim up to `query.limit` deletion candidates on one endpoint.
    ///
    /// Returned replicas are already BEING_DELETED; the read and the claim
    /// are one atomic step, so no replica is handed out twice while its
    /// claim is fresh. An empty vector is the normal steady state.
    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<Replica>, ReaperError>;

    /// BEING_DELETED -> DELETED.
    async fn confirm_deleted(&self, replica: ReplicaId) -> Result<(), ReaperError>;

    /// Transient: keep the claim and record the error.
    /// Permanent: BEING_DELETED -> DELETION_FAILED.
    async fn mark_failed(
        &self,
        replica: ReplicaId,
        kind: FailureKind,
        reason: &str,
    ) -> Result<(), ReaperError>;
}
