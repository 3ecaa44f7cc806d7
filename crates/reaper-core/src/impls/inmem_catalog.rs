//! In-memory catalog implementation.
//!
//! Used by tests and by the CLI (seeded from a JSON snapshot). Every trait
//! method takes the state lock exactly once, which gives the atomic
//! fetch-and-claim the engine relies on.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{FailureKind, ReaperError, Replica, ReplicaId, ReplicaState, Rse, RseId};
use crate::ports::{CandidateQuery, Catalog, Clock};

/// Longest minimum age a snapshot may ask for (about ten years).
const MAX_MINIMUM_AGE_SECS: u64 = 315_360_000;

/// Serializable dump of the whole catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Tombstone age a non-greedy fetch waits for before claiming.
    #[serde(default)]
    pub minimum_age_seconds: u64,
    #[serde(default)]
    pub rses: Vec<Rse>,
    #[serde(default)]
    pub replicas: Vec<Replica>,
}

/// Replica counts by state, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCounts {
    pub available: usize,
    pub being_deleted: usize,
    pub deleted: usize,
    pub deletion_failed: usize,
}

struct InMemoryCatalogState {
    rses: BTreeMap<RseId, Rse>,

    /// All replica records (single source of truth).
    replicas: HashMap<ReplicaId, Replica>,

    /// Non-terminal replicas per endpoint. Terminal replicas drop out so
    /// that fetch scans stay proportional to the live backlog.
    live_by_rse: HashMap<RseId, BTreeSet<ReplicaId>>,
}

impl InMemoryCatalogState {
    fn insert_replica(&mut self, replica: Replica) {
        if !replica.state.is_terminal() {
            self.live_by_rse
                .entry(replica.rse_id.clone())
                .or_default()
                .insert(replica.id);
        }
        self.replicas.insert(replica.id, replica);
    }

    fn retire(&mut self, rse_id: &RseId, replica: ReplicaId) {
        if let Some(ids) = self.live_by_rse.get_mut(rse_id) {
            ids.remove(&replica);
        }
    }

    fn replica_mut(&mut self, id: ReplicaId) -> Result<&mut Replica, ReaperError> {
        self.replicas
            .get_mut(&id)
            .ok_or(ReaperError::ReplicaNotFound(id))
    }

    fn counts_by_state(&self) -> ReplicaCounts {
        let mut counts = ReplicaCounts::default();
        for replica in self.replicas.values() {
            match replica.state {
                ReplicaState::Available => counts.available += 1,
                ReplicaState::BeingDeleted => counts.being_deleted += 1,
                ReplicaState::Deleted => counts.deleted += 1,
                ReplicaState::DeletionFailed => counts.deletion_failed += 1,
            }
        }
        counts
    }
}

pub struct InMemoryCatalog {
    state: Arc<Mutex<InMemoryCatalogState>>,
    clock: Arc<dyn Clock>,

    /// Minimum tombstone age before a non-greedy fetch may claim a replica.
    minimum_age: Duration,
}

impl InMemoryCatalog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_snapshot(CatalogSnapshot::default(), clock)
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot, clock: Arc<dyn Clock>) -> Self {
        let mut state = InMemoryCatalogState {
            rses: BTreeMap::new(),
            replicas: HashMap::new(),
            live_by_rse: HashMap::new(),
        };
        for rse in snapshot.rses {
            state.rses.insert(rse.id.clone(), rse);
        }
        for replica in snapshot.replicas {
            state.insert_replica(replica);
        }
        let minimum_age = snapshot.minimum_age_seconds.min(MAX_MINIMUM_AGE_SECS) as i64;
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
            minimum_age: Duration::seconds(minimum_age),
        }
    }

    /// Load a JSON snapshot from disk.
    pub async fn load(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, ReaperError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReaperError::configuration(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        let snapshot: CatalogSnapshot = serde_json::from_str(&raw).map_err(|e| {
            ReaperError::configuration(format!("cannot parse catalog {}: {e}", path.display()))
        })?;
        Ok(Self::from_snapshot(snapshot, clock))
    }

    /// Write the current state as a JSON snapshot.
    pub async fn dump(&self, path: &Path) -> Result<(), ReaperError> {
        let snapshot = self.snapshot().await;
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ReaperError::Internal(format!("serialize catalog: {e}")))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| ReaperError::Catalog(format!("write {}: {e}", path.display())))
    }

    pub fn with_minimum_age(mut self, minimum_age: Duration) -> Self {
        self.minimum_age = minimum_age;
        self
    }

    pub async fn add_rse(&self, rse: Rse) {
        let mut state = self.state.lock().await;
        state.rses.insert(rse.id.clone(), rse);
    }

    pub async fn add_replica(&self, replica: Replica) {
        let mut state = self.state.lock().await;
        state.insert_replica(replica);
    }

    pub async fn get(&self, id: ReplicaId) -> Option<Replica> {
        let state = self.state.lock().await;
        state.replicas.get(&id).cloned()
    }

    pub async fn counts_by_state(&self) -> ReplicaCounts {
        let state = self.state.lock().await;
        state.counts_by_state()
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.lock().await;
        let mut replicas: Vec<Replica> = state.replicas.values().cloned().collect();
        replicas.sort_by_key(|r| r.id);
        CatalogSnapshot {
            minimum_age_seconds: self.minimum_age.num_seconds().max(0) as u64,
            rses: state.rses.values().cloned().collect(),
            replicas,
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_rses(&self) -> Result<Vec<Rse>, ReaperError> {
        let state = self.state.lock().await;
        Ok(state.rses.values().cloned().collect())
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<Replica>, ReaperError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let Some(rse) = state.rses.get(&query.rse_id) else {
            return Err(ReaperError::UnknownRse(query.rse_id.clone()));
        };
        let Some(live) = state.live_by_rse.get(&query.rse_id) else {
            return Ok(Vec::new());
        };

        let minimum_age = self.minimum_age;
        let mut eligible: Vec<&Replica> = live
            .iter()
            .filter_map(|id| state.replicas.get(id))
            .filter(|r| query.scheme.as_deref().is_none_or(|s| r.reachable_via(rse, s)))
            .filter(|r| {
                r.is_expired(now, minimum_age, query.greedy) || r.is_stale_claim(now, query.delay)
            })
            .collect();
        // oldest tombstone first
        eligible.sort_by_key(|r| (r.tombstone, r.id));
        let chosen: Vec<ReplicaId> = eligible.iter().take(query.limit).map(|r| r.id).collect();

        let mut claimed = Vec::with_capacity(chosen.len());
        for id in chosen {
            let replica = state.replica_mut(id)?;
            replica.begin_deletion(now)?;
            claimed.push(replica.clone());
        }
        Ok(claimed)
    }

    async fn confirm_deleted(&self, replica: ReplicaId) -> Result<(), ReaperError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let record = state.replica_mut(replica)?;
        record.mark_deleted(now)?;
        let rse_id = record.rse_id.clone();
        state.retire(&rse_id, replica);
        Ok(())
    }

    async fn mark_failed(
        &self,
        replica: ReplicaId,
        kind: FailureKind,
        reason: &str,
    ) -> Result<(), ReaperError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let record = state.replica_mut(replica)?;
        match kind {
            FailureKind::Transient => record.record_transient_failure(reason.to_string()),
            FailureKind::Permanent => {
                record.mark_deletion_failed(now, reason.to_string())?;
                let rse_id = record.rse_id.clone();
                state.retire(&rse_id, replica);
                Ok(())
            }
        }
    }
}
