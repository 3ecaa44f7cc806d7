use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, instrument};

use crate::domain::{DeletionBatch, ReaperError, Rse};
use crate::ports::{CandidateQuery, Catalog, IdGenerator};

/// Pulls one bounded batch per endpoint from the catalog.
///
/// The claim itself (`AVAILABLE`/stale `BEING_DELETED` -> `BEING_DELETED`)
/// is done by the catalog inside the same call.
pub struct CandidateFetcher {
    catalog: Arc<dyn Catalog>,
    ids: Arc<dyn IdGenerator>,
    chunk_size: usize,
    delay: Duration,
    scheme: Option<String>,
    greedy: bool,
}

impl CandidateFetcher {
    pub fn new(catalog: Arc<dyn Catalog>, ids: Arc<dyn IdGenerator>, chunk_size: usize) -> Self {
        Self {
            catalog,
            ids,
            chunk_size,
            delay: Duration::seconds(600),
            scheme: None,
            greedy: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_scheme(mut self, scheme: Option<String>) -> Self {
        self.scheme = scheme;
        self
    }

    /// Global greedy switch; OR-ed with each endpoint's own flag.
    pub fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn query_for(&self, rse: &Rse) -> CandidateQuery {
        CandidateQuery {
            rse_id: rse.id.clone(),
            limit: self.chunk_size,
            scheme: self.scheme.clone(),
            delay: self.delay,
            greedy: self.greedy || rse.greedy,
        }
    }

    /// An endpoint without a protocol for the forced scheme yields an
    /// empty batch without touching the catalog.
    #[instrument(skip_all, fields(rse = %rse.id))]
    pub async fn fetch(&self, rse: &Rse) -> Result<DeletionBatch, ReaperError> {
        if let Some(scheme) = &self.scheme
            && !rse.supports_scheme(scheme)
        {
            debug!(scheme = %scheme, "rse has no protocol for the forced scheme");
            return Ok(DeletionBatch::new(self.ids.generate_batch_id(), rse.clone(), Vec::new()));
        }

        let query = self.query_for(rse);
        let replicas = self.catalog.fetch_candidates(&query).await?;
        let batch = DeletionBatch::new(self.ids.generate_batch_id(), rse.clone(), replicas);
        debug!(
            batch_id = %batch.id,
            replicas = batch.len(),
            bytes = batch.bytes(),
            greedy = query.greedy,
            "fetched candidates"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pfn, Protocol, Replica, ReplicaState, RseId};
    use crate::impls::InMemoryCatalog;
    use crate::ports::{Clock, FixedClock, UlidGenerator};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        clock: Arc<FixedClock>,
        catalog: Arc<InMemoryCatalog>,
        ids: Arc<UlidGenerator>,
    }

    async fn fixture(rse: Rse, replicas: usize) -> Fixture {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let catalog = Arc::new(
            InMemoryCatalog::new(clock.clone()).with_minimum_age(Duration::hours(1)),
        );
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        let now = clock.now();
        for i in 0..replicas {
            let pfn = Pfn::parse(&format!("mem://{}/f{i}", rse.id)).unwrap();
            catalog
                .add_replica(
                    Replica::new(ids.generate_replica_id(), "user", format!("f{i}"), rse.id.clone(), pfn, now)
                        .with_tombstone(now - Duration::minutes(10)),
                )
                .await;
        }
        catalog.add_rse(rse).await;
        Fixture { clock, catalog, ids }
    }

    #[tokio::test]
    async fn batch_is_bounded_by_chunk_size() {
        let f = fixture(Rse::new("SITE_A").with_greedy(true), 5).await;
        let fetcher = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 3);

        let batch = fetcher.fetch(&Rse::new("SITE_A").with_greedy(true)).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.rse_id(), &RseId::new("SITE_A"));
        assert!(batch.replicas.iter().all(|r| r.state == ReplicaState::BeingDeleted));
    }

    #[tokio::test]
    async fn young_tombstones_need_greedy() {
        let f = fixture(Rse::new("SITE_A"), 2).await;
        let rse = Rse::new("SITE_A");

        let polite = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 10);
        assert!(polite.fetch(&rse).await.unwrap().is_empty());

        let greedy = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 10).with_greedy(true);
        assert_eq!(greedy.fetch(&rse).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn endpoint_greedy_flag_is_honoured() {
        let f = fixture(Rse::new("SITE_A").with_greedy(true), 2).await;
        let fetcher = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 10);

        let rse = Rse::new("SITE_A").with_greedy(true);
        assert!(fetcher.query_for(&rse).greedy);
        assert_eq!(fetcher.fetch(&rse).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn forced_scheme_skips_rses_without_that_protocol() {
        let rse = Rse::new("SITE_A")
            .with_greedy(true)
            .with_protocol(Protocol::new("mem").with_hostname("SITE_A"));
        let f = fixture(rse.clone(), 2).await;

        let davs = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 10)
            .with_scheme(Some("davs".into()));
        assert!(davs.fetch(&rse).await.unwrap().is_empty());
        assert_eq!(f.catalog.counts_by_state().await.available, 2);

        let mem = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 10)
            .with_scheme(Some("mem".into()));
        let batch = mem.fetch(&rse).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rse.protocols.len(), 1);
    }

    #[tokio::test]
    async fn each_fetch_gets_a_fresh_batch_id() {
        let f = fixture(Rse::new("SITE_A"), 0).await;
        let fetcher = CandidateFetcher::new(f.catalog.clone(), f.ids.clone(), 10);
        let rse = Rse::new("SITE_A");

        let a = fetcher.fetch(&rse).await.unwrap();
        f.clock.advance(Duration::milliseconds(1));
        let b = fetcher.fetch(&rse).await.unwrap();
        assert!(a.is_empty() && b.is_empty());
        assert_ne!(a.id, b.id);
    }
}
