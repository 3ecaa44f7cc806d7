//! BulkDeletionExecutor - バッチ削除と結果の反映
//!
//! For one batch:
//! 1. resolve every replica's PFN against the endpoint's protocols
//! 2. group the resolved PFNs by scheme
//! 3. per group: connect -> bulk_delete -> close on the scheme's driver
//! 4. reconcile every outcome with the catalog, one item at a time
//! 5. report one success/failure event for the endpoint to the tracker
//!
//! Nothing in here aborts the batch: a PFN that does not belong to the
//! endpoint is a permanent failure of its own item, a missing driver or a
//! refused connect becomes a transient failure for that group, and a catalog
//! error only affects its own item.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::app::exclusion::ExclusionTracker;
use crate::app::registry::DriverRegistry;
use crate::app::status::Tally;
use crate::domain::{
    BatchVerdict, DeletionBatch, DeletionOutcome, FailureKind, Pfn, Reconciliation, batch_verdict,
    reconcile,
};
use crate::ports::Catalog;

pub struct BulkDeletionExecutor {
    catalog: Arc<dyn Catalog>,
    drivers: Arc<DriverRegistry>,
    tracker: Arc<ExclusionTracker>,
    scheme: Option<String>,
}

impl BulkDeletionExecutor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        drivers: Arc<DriverRegistry>,
        tracker: Arc<ExclusionTracker>,
    ) -> Self {
        Self {
            catalog,
            drivers,
            tracker,
            scheme: None,
        }
    }

    /// Forced scheme used to build PFNs for path-only replicas.
    pub fn with_scheme(mut self, scheme: Option<String>) -> Self {
        self.scheme = scheme;
        self
    }

    /// Run the drivers for every scheme present in the batch.
    /// Returns one outcome per replica, in batch order.
    async fn delete_all(&self, batch: &DeletionBatch) -> Vec<DeletionOutcome> {
        let mut outcomes = vec![None; batch.len()];
        let mut groups: BTreeMap<String, Vec<(usize, Pfn)>> = BTreeMap::new();
        for (i, replica) in batch.replicas.iter().enumerate() {
            match replica.resolve_pfn(&batch.rse, self.scheme.as_deref()) {
                Ok(pfn) => groups.entry(pfn.scheme().to_string()).or_default().push((i, pfn)),
                Err(err) => outcomes[i] = Some(DeletionOutcome::permanent(err.to_string())),
            }
        }

        for (scheme, members) in groups {
            let scheme = scheme.as_str();
            let (indices, pfns): (Vec<usize>, Vec<Pfn>) = members.into_iter().unzip();
            let group_outcomes = match self.drivers.get(scheme) {
                None => {
                    warn!(scheme, replicas = indices.len(), "no deletion driver for scheme");
                    vec![DeletionOutcome::transient(format!("no driver for scheme '{scheme}'")); indices.len()]
                }
                Some(driver) => match driver.connect().await {
                    Err(err) => {
                        warn!(scheme, error = %err, "driver connect failed");
                        vec![DeletionOutcome::transient(err.to_string()); indices.len()]
                    }
                    Ok(()) => {
                        let result = driver.bulk_delete(&pfns).await;
                        driver.close().await;
                        result
                    }
                },
            };

            let mut group_outcomes = group_outcomes.into_iter();
            for i in indices {
                outcomes[i] = Some(group_outcomes.next().unwrap_or_else(|| {
                    DeletionOutcome::transient(format!("driver for '{scheme}' returned no outcome"))
                }));
            }
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| DeletionOutcome::transient("not attempted")))
            .collect()
    }

    #[instrument(
        name = "execute_batch",
        skip_all,
        fields(rse = %batch.rse_id(), batch_id = %batch.id, replicas = batch.len(), bytes = batch.bytes())
    )]
    pub async fn execute(&self, batch: &DeletionBatch) -> Tally {
        let mut tally = Tally {
            batches: 1,
            ..Tally::default()
        };
        let outcomes = self.delete_all(batch).await;

        for (replica, outcome) in batch.replicas.iter().zip(&outcomes) {
            tally.record_outcome(outcome, replica.bytes);
            let result = match reconcile(outcome) {
                Reconciliation::ConfirmDeleted => self.catalog.confirm_deleted(replica.id).await,
                Reconciliation::MarkFailed { kind, reason } => {
                    if kind == FailureKind::Permanent {
                        warn!(
                            replica = %replica.id,
                            did = %replica.did(),
                            location = %replica.location(),
                            reason = %reason,
                            "permanent deletion failure"
                        );
                    } else {
                        debug!(replica = %replica.id, reason = %reason, "transient deletion failure");
                    }
                    self.catalog.mark_failed(replica.id, kind, &reason).await
                }
            };
            if let Err(err) = result {
                tally.catalog_errors += 1;
                error!(replica = %replica.id, error = %err, "catalog update failed");
            }
        }

        match batch_verdict(&outcomes) {
            BatchVerdict::Success => self.tracker.record_success(batch.rse_id()),
            BatchVerdict::Failure => {
                self.tracker.record_failure(batch.rse_id());
            }
        }

        info!(
            deleted = tally.deleted,
            transient = tally.transient,
            permanent = tally.permanent,
            bytes = tally.bytes_freed,
            "batch done"
        );
        tally
    }
}
