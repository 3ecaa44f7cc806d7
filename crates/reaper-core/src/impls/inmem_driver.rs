//! InMemoryDriver - 開発用・テスト用のストレージ
//!
//! A fake endpoint that holds a set of PFNs. Failures can be scripted per
//! PFN or for the whole endpoint, which is how the exclusion scenarios are
//! exercised without a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{DeletionOutcome, Pfn};
use crate::ports::{DeletionDriver, DriverError};

#[derive(Default)]
struct Store {
    files: HashSet<String>,
    scripted: HashMap<String, DeletionOutcome>,
    outage: Option<DeletionOutcome>,
    deleted: Vec<Pfn>,
}

pub struct InMemoryDriver {
    scheme: String,
    store: Mutex<Store>,
    refuse_connect: AtomicBool,
    delete_calls: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl InMemoryDriver {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            store: Mutex::new(Store::default()),
            refuse_connect: AtomicBool::new(false),
            delete_calls: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, pfn: &Pfn) {
        self.store().files.insert(pfn.as_str().to_string());
    }

    pub fn exists(&self, pfn: &Pfn) -> bool {
        self.store().files.contains(pfn.as_str())
    }

    /// Every delete of `pfn` returns `outcome` until cleared.
    pub fn script(&self, pfn: &Pfn, outcome: DeletionOutcome) {
        self.store()
            .scripted
            .insert(pfn.as_str().to_string(), outcome);
    }

    pub fn clear_script(&self, pfn: &Pfn) {
        self.store().scripted.remove(pfn.as_str());
    }

    /// Every delete returns `outcome` while set (endpoint-wide outage).
    pub fn set_outage(&self, outcome: Option<DeletionOutcome>) {
        self.store().outage = outcome;
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// PFNs whose delete returned `Deleted`, in call order.
    pub fn deleted(&self) -> Vec<Pfn> {
        self.store().deleted.clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeletionDriver for InMemoryDriver {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn connect(&self) -> Result<(), DriverError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(DriverError::Connect {
                scheme: self.scheme.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn delete(&self, pfn: &Pfn) -> DeletionOutcome {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store();
        if let Some(outcome) = store.outage.clone() {
            return outcome;
        }
        if let Some(outcome) = store.scripted.get(pfn.as_str()).cloned() {
            return outcome;
        }
        // 存在しなくても削除済みとして扱う（冪等）
        store.files.remove(pfn.as_str());
        store.deleted.push(pfn.clone());
        DeletionOutcome::Deleted
    }
}

/// Test driver that raises a stop request from inside `delete`, then takes
/// a moment before deleting through the wrapped in-memory driver.
#[cfg(test)]
pub(crate) struct StopDuringDelete {
    pub inner: std::sync::Arc<InMemoryDriver>,
    pub handle: crate::app::ShutdownHandle,
}

#[cfg(test)]
#[async_trait]
impl DeletionDriver for StopDuringDelete {
    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    async fn delete(&self, pfn: &Pfn) -> DeletionOutcome {
        self.handle.request();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.inner.delete(pfn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pfn(s: &str) -> Pfn {
        Pfn::parse(s).unwrap()
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let driver = InMemoryDriver::new("mem");
        let p = pfn("mem://rse/a");
        driver.put(&p);

        assert_eq!(driver.delete(&p).await, DeletionOutcome::Deleted);
        assert!(!driver.exists(&p));
        assert_eq!(driver.deleted(), vec![p]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let driver = InMemoryDriver::new("mem");
        let p = pfn("mem://rse/a");
        driver.put(&p);

        assert_eq!(driver.delete(&p).await, DeletionOutcome::Deleted);
        assert_eq!(driver.delete(&p).await, DeletionOutcome::Deleted);
        assert_eq!(driver.delete_calls(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_win_until_cleared() {
        let driver = InMemoryDriver::new("mem");
        let p = pfn("mem://rse/a");
        driver.put(&p);
        driver.script(&p, DeletionOutcome::permanent("EACCES"));

        assert_eq!(driver.delete(&p).await, DeletionOutcome::permanent("EACCES"));
        assert!(driver.exists(&p));

        driver.clear_script(&p);
        assert_eq!(driver.delete(&p).await, DeletionOutcome::Deleted);
    }

    #[tokio::test]
    async fn bulk_delete_isolates_items() {
        let driver = InMemoryDriver::new("mem");
        let pfns = vec![pfn("mem://rse/a"), pfn("mem://rse/b"), pfn("mem://rse/c")];
        driver.script(&pfns[1], DeletionOutcome::transient("busy"));

        let outcomes = driver.bulk_delete(&pfns).await;
        assert_eq!(
            outcomes,
            vec![
                DeletionOutcome::Deleted,
                DeletionOutcome::transient("busy"),
                DeletionOutcome::Deleted,
            ]
        );
    }

    #[tokio::test]
    async fn refused_connect_is_reported() {
        let driver = InMemoryDriver::new("mem");
        driver.refuse_connect(true);
        assert!(driver.connect().await.is_err());
        assert_eq!(driver.connects(), 1);
    }
}
