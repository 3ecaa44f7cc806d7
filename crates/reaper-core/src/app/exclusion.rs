//! ExclusionTracker - RSE 単位の自動除外
//!
//! `ACTIVE -> EXCLUDED -> ACTIVE`. An endpoint is excluded once its
//! consecutive failed batches reach the threshold, and comes back lazily on
//! the first consultation after the timeout. There is no timer task.
//!
//! Every read-modify-write happens under one mutex, so concurrent workers
//! never lose a count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::domain::RseId;
use crate::ports::Clock;

#[derive(Debug, Clone, Default)]
struct Health {
    consecutive_failures: u32,
    excluded_until: Option<DateTime<Utc>>,
}

/// Point-in-time view of one endpoint, for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    pub rse_id: RseId,
    pub consecutive_failures: u32,
    pub excluded_until: Option<DateTime<Utc>>,
}

impl EndpointHealth {
    pub fn is_excluded(&self) -> bool {
        self.excluded_until.is_some()
    }
}

pub struct ExclusionTracker {
    /// 0 disables exclusion.
    threshold: u32,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    endpoints: Mutex<HashMap<RseId, Health>>,
}

impl ExclusionTracker {
    pub fn new(threshold: u32, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold,
            timeout,
            clock,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RseId, Health>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expire a lapsed exclusion in place. Returns whether `health` is still excluded.
    fn refresh(health: &mut Health, rse: &RseId, now: DateTime<Utc>) -> bool {
        match health.excluded_until {
            Some(until) if now >= until => {
                health.excluded_until = None;
                health.consecutive_failures = 0;
                info!(rse = %rse, "auto-exclusion expired");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn is_excluded(&self, rse: &RseId) -> bool {
        let now = self.clock.now();
        let mut endpoints = self.lock();
        match endpoints.get_mut(rse) {
            Some(health) => Self::refresh(health, rse, now),
            None => false,
        }
    }

    /// Count one failed batch. Returns `true` when this failure excluded the endpoint.
    pub fn record_failure(&self, rse: &RseId) -> bool {
        let now = self.clock.now();
        let mut endpoints = self.lock();
        let health = endpoints.entry(rse.clone()).or_default();
        if Self::refresh(health, rse, now) {
            return false;
        }

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        if self.threshold == 0 || health.consecutive_failures < self.threshold {
            return false;
        }

        let until = now + self.timeout;
        health.excluded_until = Some(until);
        warn!(
            rse = %rse,
            failures = health.consecutive_failures,
            until = %until,
            "rse auto-excluded"
        );
        true
    }

    /// Count one fully successful batch.
    pub fn record_success(&self, rse: &RseId) {
        let now = self.clock.now();
        let mut endpoints = self.lock();
        if let Some(health) = endpoints.get_mut(rse)
            && !Self::refresh(health, rse, now)
        {
            health.consecutive_failures = 0;
        }
    }

    pub fn consecutive_failures(&self, rse: &RseId) -> u32 {
        self.lock()
            .get(rse)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
    }

    /// Every endpoint seen so far, sorted by name. Lapsed exclusions are
    /// expired first.
    pub fn snapshot(&self) -> Vec<EndpointHealth> {
        let now = self.clock.now();
        let mut endpoints = self.lock();
        let mut out: Vec<EndpointHealth> = endpoints
            .iter_mut()
            .map(|(rse, health)| {
                Self::refresh(health, rse, now);
                EndpointHealth {
                    rse_id: rse.clone(),
                    consecutive_failures: health.consecutive_failures,
                    excluded_until: health.excluded_until,
                }
            })
            .collect();
        out.sort_by(|a, b| a.rse_id.cmp(&b.rse_id));
        out
    }
}
