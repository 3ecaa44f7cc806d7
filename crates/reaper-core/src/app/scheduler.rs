use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::app::exclusion::ExclusionTracker;
use crate::app::executor::BulkDeletionExecutor;
use crate::app::fetcher::CandidateFetcher;
use crate::app::shutdown::Shutdown;
use crate::app::status::Tally;
use crate::domain::{ReaperError, Rse, RseId};

/// Deal `rses` round-robin over `workers` slots. Slot `i` gets
/// `rses[i], rses[i + workers], ...`. Never returns an empty outer vec.
pub fn partition(rses: &[Rse], workers: usize) -> Vec<Vec<Rse>> {
    let workers = workers.max(1);
    let mut slots = vec![Vec::new(); workers];
    for (i, rse) in rses.iter().enumerate() {
        slots[i % workers].push(rse.clone());
    }
    slots
}

/// Set of endpoints currently held by some worker.
#[derive(Clone, Default)]
pub struct RseLocks {
    held: Arc<Mutex<HashSet<RseId>>>,
}

impl RseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<RseId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` if another holder has it.
    pub fn try_acquire(&self, rse: &RseId) -> Option<RseGuard> {
        if !self.lock().insert(rse.clone()) {
            return None;
        }
        Some(RseGuard {
            locks: self.clone(),
            rse: rse.clone(),
        })
    }

    pub fn is_held(&self, rse: &RseId) -> bool {
        self.lock().contains(rse)
    }
}

/// Releases the endpoint on drop.
pub struct RseGuard {
    locks: RseLocks,
    rse: RseId,
}

impl Drop for RseGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.rse);
    }
}

struct Shared {
    fetcher: CandidateFetcher,
    executor: BulkDeletionExecutor,
    tracker: Arc<ExclusionTracker>,
    locks: RseLocks,
}

/// Fixed-size pool; one tokio task per worker per cycle.
pub struct WorkerPool {
    threads: usize,
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(
        threads: usize,
        fetcher: CandidateFetcher,
        executor: BulkDeletionExecutor,
        tracker: Arc<ExclusionTracker>,
    ) -> Self {
        Self {
            threads: threads.max(1),
            shared: Arc::new(Shared {
                fetcher,
                executor,
                tracker,
                locks: RseLocks::new(),
            }),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn locks(&self) -> &RseLocks {
        &self.shared.locks
    }

    pub fn tracker(&self) -> &Arc<ExclusionTracker> {
        &self.shared.tracker
    }

    /// Run one pass over `rses` and wait for every worker.
    ///
    /// A panicked worker is an internal error; the others still finish
    /// their current batch first.
    pub async fn run_cycle(&self, rses: &[Rse], shutdown: &Shutdown) -> Result<Tally, ReaperError> {
        let joins: Vec<JoinHandle<Tally>> = partition(rses, self.threads)
            .into_iter()
            .enumerate()
            .filter(|(_, share)| !share.is_empty())
            .map(|(worker_id, share)| {
                let shared = Arc::clone(&self.shared);
                let shutdown = shutdown.clone();
                tokio::spawn(run_worker(worker_id, share, shared, shutdown))
            })
            .collect();

        let mut tally = Tally::default();
        let mut panicked = None;
        for join in joins {
            match join.await {
                Ok(t) => tally.merge(&t),
                Err(err) => {
                    error!(error = %err, "deletion worker failed");
                    panicked = Some(err);
                }
            }
        }
        match panicked {
            Some(err) => Err(ReaperError::Internal(format!("deletion worker failed: {err}"))),
            None => Ok(tally),
        }
    }
}

#[instrument(skip(rses, shared, shutdown), fields(assigned = rses.len()))]
async fn run_worker(worker: usize, rses: Vec<Rse>, shared: Arc<Shared>, shutdown: Shutdown) -> Tally {
    let mut tally = Tally::default();

    for rse in rses {
        // 停止要求はバッチの合間でのみ見る
        if shutdown.is_stopped() {
            debug!("stop requested, leaving remaining rses");
            break;
        }

        let Some(_guard) = shared.locks.try_acquire(&rse.id) else {
            debug!(rse = %rse.id, "rse busy in another worker");
            tally.skipped_busy += 1;
            continue;
        };

        if shared.tracker.is_excluded(&rse.id) {
            debug!(rse = %rse.id, "rse auto-excluded, skipping");
            tally.skipped_excluded += 1;
            continue;
        }

        let batch = match shared.fetcher.fetch(&rse).await {
            Ok(batch) => batch,
            Err(err) => {
                error!(rse = %rse.id, error = %err, "fetching candidates failed");
                tally.fetch_errors += 1;
                continue;
            }
        };
        if batch.is_empty() {
            tally.empty += 1;
            continue;
        }

        let batch_tally = shared.executor.execute(&batch).await;
        tally.merge(&batch_tally);
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::registry::DriverRegistry;
    use crate::app::shutdown;
    use crate::domain::{Pfn, Protocol, Replica};
    use crate::impls::inmem_driver::StopDuringDelete;
    use crate::impls::{InMemoryCatalog, InMemoryDriver, ReplicaCounts};
    use crate::ports::DeletionDriver;
    use crate::ports::{Clock, FixedClock, IdGenerator, UlidGenerator};
    use chrono::{Duration, Utc};
    use rstest::rstest;

    fn rses(n: usize) -> Vec<Rse> {
        (0..n)
            .map(|i| Rse::new(format!("RSE_{i}")).with_protocol(Protocol::new("mem").with_hostname("host")))
            .collect()
    }

    #[rstest]
    #[case(5, 2, vec![vec!["RSE_0", "RSE_2", "RSE_4"], vec!["RSE_1", "RSE_3"]])]
    #[case(2, 3, vec![vec!["RSE_0"], vec!["RSE_1"], vec![]])]
    #[case(3, 0, vec![vec!["RSE_0", "RSE_1", "RSE_2"]])]
    #[case(0, 2, vec![vec![], vec![]])]
    fn partition_is_round_robin(
        #[case] n: usize,
        #[case] workers: usize,
        #[case] expected: Vec<Vec<&str>>,
    ) {
        let slots = partition(&rses(n), workers);
        let names: Vec<Vec<&str>> = slots
            .iter()
            .map(|s| s.iter().map(|r| r.id.as_str()).collect())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn guard_releases_on_drop() {
        let locks = RseLocks::new();
        let rse = RseId::new("SITE_A");

        let guard = locks.try_acquire(&rse).unwrap();
        assert!(locks.try_acquire(&rse).is_none());
        assert!(locks.is_held(&rse));

        drop(guard);
        assert!(!locks.is_held(&rse));
        assert!(locks.try_acquire(&rse).is_some());
    }

    struct Fixture {
        catalog: Arc<InMemoryCatalog>,
        driver: Arc<InMemoryDriver>,
        pool: WorkerPool,
        rses: Vec<Rse>,
    }

    async fn fixture(threads: usize, rse_count: usize, per_rse: usize) -> Fixture {
        fixture_with(threads, rse_count, per_rse, |mem| -> Arc<dyn DeletionDriver> { mem }).await
    }

    async fn fixture_with(
        threads: usize,
        rse_count: usize,
        per_rse: usize,
        wrap: impl FnOnce(Arc<InMemoryDriver>) -> Arc<dyn DeletionDriver>,
    ) -> Fixture {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        let catalog = Arc::new(InMemoryCatalog::new(clock.clone()));
        let driver = Arc::new(InMemoryDriver::new("mem"));
        let rses = rses(rse_count);
        let now = clock.now();
        for rse in &rses {
            catalog.add_rse(rse.clone()).await;
            for i in 0..per_rse {
                let pfn = Pfn::parse(&format!("mem://host/{}/{i}", rse.id)).unwrap();
                driver.put(&pfn);
                catalog
                    .add_replica(
                        Replica::new(ids.generate_replica_id(), "user", format!("{i}"), rse.id.clone(), pfn, now)
                            .with_tombstone(now - Duration::days(1)),
                    )
                    .await;
            }
        }

        let mut drivers = DriverRegistry::new();
        drivers.register(wrap(driver.clone())).unwrap();
        let tracker = Arc::new(ExclusionTracker::new(3, Duration::seconds(600), clock.clone()));
        let fetcher = CandidateFetcher::new(catalog.clone(), ids, 10);
        let executor = BulkDeletionExecutor::new(catalog.clone(), Arc::new(drivers), tracker.clone());
        Fixture {
            catalog,
            driver,
            pool: WorkerPool::new(threads, fetcher, executor, tracker),
            rses,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_rse_gets_one_batch() {
        let f = fixture(3, 7, 4).await;

        let tally = f.pool.run_cycle(&f.rses, &Shutdown::never()).await.unwrap();

        assert_eq!(tally.batches, 7);
        assert_eq!(tally.deleted, 28);
        assert_eq!(f.driver.deleted().len(), 28);
        assert_eq!(f.catalog.counts_by_state().await.deleted, 28);
        for rse in &f.rses {
            assert!(!f.pool.locks().is_held(&rse.id));
        }
    }

    #[tokio::test]
    async fn held_rse_is_skipped_as_busy() {
        let f = fixture(2, 2, 1).await;
        let _held = f.pool.locks().try_acquire(&f.rses[0].id).unwrap();

        let tally = f.pool.run_cycle(&f.rses, &Shutdown::never()).await.unwrap();

        assert_eq!(tally.skipped_busy, 1);
        assert_eq!(tally.deleted, 1);
    }

    #[tokio::test]
    async fn excluded_rse_is_skipped() {
        let f = fixture(1, 2, 1).await;
        for _ in 0..3 {
            f.pool.tracker().record_failure(&f.rses[1].id);
        }

        let tally = f.pool.run_cycle(&f.rses, &Shutdown::never()).await.unwrap();

        assert_eq!(tally.skipped_excluded, 1);
        assert_eq!(tally.deleted, 1);
    }

    #[tokio::test]
    async fn stopped_pool_takes_no_new_batches() {
        let f = fixture(2, 4, 1).await;
        let (handle, stop) = shutdown::channel();
        handle.request();

        let tally = f.pool.run_cycle(&f.rses, &stop).await.unwrap();

        assert_eq!(tally.batches, 0);
        assert_eq!(f.driver.delete_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_a_batch_finishes_it_and_skips_the_rest() {
        let (handle, stop) = shutdown::channel();
        let f = fixture_with(1, 2, 3, |mem| -> Arc<dyn DeletionDriver> {
            Arc::new(StopDuringDelete { inner: mem, handle })
        })
        .await;

        let tally = f.pool.run_cycle(&f.rses, &stop).await.unwrap();

        assert!(stop.is_stopped());
        assert_eq!(tally.batches, 1);
        assert_eq!(tally.deleted, 3);
        assert_eq!(
            f.catalog.counts_by_state().await,
            ReplicaCounts {
                available: 3,
                being_deleted: 0,
                deleted: 3,
                deletion_failed: 0,
            }
        );
        assert!(!f.pool.locks().is_held(&f.rses[0].id));
    }

    #[tokio::test]
    async fn unknown_rse_counts_as_fetch_error() {
        let f = fixture(1, 1, 1).await;
        let mut rses = f.rses.clone();
        rses.push(Rse::new("GONE"));

        let tally = f.pool.run_cycle(&rses, &Shutdown::never()).await.unwrap();

        assert_eq!(tally.fetch_errors, 1);
        assert_eq!(tally.deleted, 1);
    }
}
