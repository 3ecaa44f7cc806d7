//! Status - サイクル単位の集計
//!
//! `Tally` is the set of counters shared by batches, workers, cycles and
//! whole runs; each level just merges the one below it.

use std::time::Duration;

use crate::app::exclusion::EndpointHealth;
use crate::domain::{DeletionOutcome, FailureKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub batches: u64,
    pub deleted: u64,
    pub transient: u64,
    pub permanent: u64,
    pub bytes_freed: u64,
    /// Endpoints skipped because they were auto-excluded.
    pub skipped_excluded: u64,
    /// Endpoints skipped because another worker held them.
    pub skipped_busy: u64,
    /// Endpoints that had nothing to delete.
    pub empty: u64,
    pub fetch_errors: u64,
    pub catalog_errors: u64,
}

impl Tally {
    pub fn record_outcome(&mut self, outcome: &DeletionOutcome, bytes: u64) {
        match outcome.failure_kind() {
            None => {
                self.deleted += 1;
                self.bytes_freed += bytes;
            }
            Some(FailureKind::Transient) => self.transient += 1,
            Some(FailureKind::Permanent) => self.permanent += 1,
        }
    }

    pub fn merge(&mut self, other: &Tally) {
        self.batches += other.batches;
        self.deleted += other.deleted;
        self.transient += other.transient;
        self.permanent += other.permanent;
        self.bytes_freed += other.bytes_freed;
        self.skipped_excluded += other.skipped_excluded;
        self.skipped_busy += other.skipped_busy;
        self.empty += other.empty;
        self.fetch_errors += other.fetch_errors;
        self.catalog_errors += other.catalog_errors;
    }

    pub fn failures(&self) -> u64 {
        self.transient + self.permanent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Endpoints in scope for this cycle.
    pub rses: usize,
    pub tally: Tally,
    pub elapsed: Duration,
    /// Tracker state once the cycle's batches were reported.
    pub endpoints: Vec<EndpointHealth>,
}

impl CycleReport {
    pub fn excluded(&self) -> impl Iterator<Item = &EndpointHealth> {
        self.endpoints.iter().filter(|h| h.is_excluded())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub tally: Tally,
    /// Endpoint health when the run ended.
    pub endpoints: Vec<EndpointHealth>,
}

impl RunSummary {
    pub fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.tally.merge(&report.tally);
        self.endpoints.clone_from(&report.endpoints);
    }
}
