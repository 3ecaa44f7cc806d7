//! CycleController - fetch -> delete -> reconcile を繰り返す
//!
//! Each cycle re-resolves the endpoint set, runs the worker pool over it,
//! then sleeps for whatever is left of `sleep_time`. In run-once mode there
//! is exactly one cycle and the stop flag is not consulted inside it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::app::exclusion::ExclusionTracker;
use crate::app::scheduler::WorkerPool;
use crate::app::selector::RseSelector;
use crate::app::shutdown::Shutdown;
use crate::app::status::{CycleReport, RunSummary};
use crate::domain::{ReaperError, Rse};
use crate::ports::Catalog;

pub struct CycleController {
    selector: RseSelector,
    catalog: Arc<dyn Catalog>,
    pool: WorkerPool,
    sleep_time: Duration,
    run_once: bool,
    shutdown: Shutdown,
    cycle: u64,
    rses: Vec<Rse>,
}

impl CycleController {
    pub fn new(
        selector: RseSelector,
        catalog: Arc<dyn Catalog>,
        pool: WorkerPool,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            selector,
            catalog,
            pool,
            sleep_time: Duration::from_secs(crate::config::DEFAULT_SLEEP_SECS),
            run_once: false,
            shutdown,
            cycle: 0,
            rses: Vec::new(),
        }
    }

    pub fn with_sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn tracker(&self) -> &Arc<ExclusionTracker> {
        self.pool.tracker()
    }

    /// Endpoints used by the last cycle.
    pub fn rses(&self) -> &[Rse] {
        &self.rses
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Re-resolve the endpoint set. Before the first successful resolution
    /// an error is returned; afterwards the previous set is kept.
    async fn refresh_rses(&mut self) -> Result<(), ReaperError> {
        match self.selector.resolve(self.catalog.as_ref()).await {
            Ok(rses) => {
                self.rses = rses;
                Ok(())
            }
            Err(err) if !self.rses.is_empty() => {
                warn!(error = %err, kept = self.rses.len(), "rse resolution failed, keeping previous set");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run a single cycle over the current endpoint set.
    #[instrument(skip(self), fields(cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ReaperError> {
        // 経過時間には RSE 解決の時間も含める
        let started = Instant::now();
        self.refresh_rses().await?;
        self.cycle += 1;

        // run-once はサイクル開始後の停止要求を無視する
        let shutdown = if self.run_once {
            Shutdown::never()
        } else {
            self.shutdown.clone()
        };

        let tally = self.pool.run_cycle(&self.rses, &shutdown).await?;
        let report = CycleReport {
            cycle: self.cycle,
            rses: self.rses.len(),
            tally,
            elapsed: started.elapsed(),
            endpoints: self.tracker().snapshot(),
        };

        info!(
            rses = report.rses,
            batches = tally.batches,
            deleted = tally.deleted,
            transient = tally.transient,
            permanent = tally.permanent,
            bytes = tally.bytes_freed,
            excluded = tally.skipped_excluded,
            busy = tally.skipped_busy,
            empty = tally.empty,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "cycle finished"
        );
        let excluded: Vec<&str> = report.excluded().map(|h| h.rse_id.as_str()).collect();
        if !excluded.is_empty() {
            info!(rses = ?excluded, "rses currently auto-excluded");
        }
        Ok(report)
    }

    /// Run until stopped (or once, in run-once mode).
    ///
    /// Only configuration errors on the first resolution and internal errors
    /// end the loop early.
    pub async fn run(mut self) -> Result<RunSummary, ReaperError> {
        let mut summary = RunSummary::default();

        if self.run_once {
            let report = self.run_cycle().await?;
            summary.record(&report);
        } else {
            loop {
                if self.shutdown.is_stopped() {
                    break;
                }
                let report = self.run_cycle().await?;
                summary.record(&report);

                let remaining = self.sleep_time.saturating_sub(report.elapsed);
                let stopped = tokio::select! {
                    _ = tokio::time::sleep(remaining) => false,
                    _ = self.shutdown.wait() => true,
                };
                if stopped {
                    break;
                }
            }
        }

        summary.endpoints = self.tracker().snapshot();
        for health in summary.endpoints.iter().filter(|h| h.consecutive_failures > 0 || h.is_excluded()) {
            info!(
                rse = %health.rse_id,
                consecutive_failures = health.consecutive_failures,
                excluded_until = ?health.excluded_until,
                "endpoint health at stop"
            );
        }
        info!(
            cycles = summary.cycles,
            deleted = summary.tally.deleted,
            failures = summary.tally.failures(),
            "reaper stopped"
        );
        Ok(summary)
    }
}
