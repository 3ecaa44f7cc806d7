//! DeletionDriver port - the transport that actually removes bytes.
//!
//! One driver serves one PFN scheme. Drivers bound their own call latency
//! and report a stuck endpoint as `TransientFailure` instead of hanging.

use async_trait::async_trait;

use crate::domain::{DeletionOutcome, Pfn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("connect to {scheme} endpoint failed: {reason}")]
    Connect { scheme: String, reason: String },
}

#[async_trait]
pub trait DeletionDriver: Send + Sync {
    /// PFN scheme served by this driver (`file`, `root`, `davs`, ...).
    fn scheme(&self) -> &str;

    /// Called once before each batch.
    async fn connect(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Called once after each batch, also after a partial failure.
    async fn close(&self) {}

    /// Delete one file. Must be idempotent: a missing file is `Deleted`.
    async fn delete(&self, pfn: &Pfn) -> DeletionOutcome;

    /// Delete many files; one outcome per input, same order.
    ///
    /// Drivers with a native bulk call override this.
    async fn bulk_delete(&self, pfns: &[Pfn]) -> Vec<DeletionOutcome> {
        let mut outcomes = Vec::with_capacity(pfns.len());
        for pfn in pfns {
            outcomes.push(self.delete(pfn).await);
        }
        outcomes
    }
}
