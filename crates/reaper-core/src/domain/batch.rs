//! DeletionBatch: replicas from one endpoint handed to one executor call.

use super::ids::{BatchId, RseId};
use super::replica::Replica;
use super::rse::Rse;

/// Up to chunk-size replicas, all from `rse`, all claimed
/// (BEING_DELETED) by the fetch that produced them.
#[derive(Debug, Clone)]
pub struct DeletionBatch {
    pub id: BatchId,
    /// Endpoint as resolved for this cycle; its protocols address the PFNs.
    pub rse: Rse,
    pub replicas: Vec<Replica>,
}

impl DeletionBatch {
    pub fn new(id: BatchId, rse: Rse, replicas: Vec<Replica>) -> Self {
        Self { id, rse, replicas }
    }

    pub fn rse_id(&self) -> &RseId {
        &self.rse.id
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn bytes(&self) -> u64 {
        self.replicas.iter().map(|r| r.bytes).sum()
    }
}
