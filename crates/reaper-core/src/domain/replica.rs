//! Replica record and its deletion state machine.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ReaperError;
use super::ids::{ReplicaId, RseId};
use super::pfn::{Pfn, PfnError};
use super::rse::Rse;

/// Lifecycle of a replica from the reaper's point of view.
///
/// State transitions:
/// - Available -> BeingDeleted -> Deleted
/// - Available -> BeingDeleted -> DeletionFailed
/// - BeingDeleted -> BeingDeleted (stale claim reclaimed after delay-seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicaState {
    Available,
    BeingDeleted,
    Deleted,
    DeletionFailed,
}

impl ReplicaState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplicaState::Deleted | ReplicaState::DeletionFailed)
    }

    pub fn can_transition_to(self, next: ReplicaState) -> bool {
        use ReplicaState::*;
        matches!(
            (self, next),
            (Available, BeingDeleted)
                | (BeingDeleted, BeingDeleted)
                | (BeingDeleted, Deleted)
                | (BeingDeleted, DeletionFailed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReplicaState::Available => "AVAILABLE",
            ReplicaState::BeingDeleted => "BEING_DELETED",
            ReplicaState::Deleted => "DELETED",
            ReplicaState::DeletionFailed => "DELETION_FAILED",
        }
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical copy of `scope:name` at one endpoint.
///
/// The catalog is the single source of truth; workers only ever hold
/// clones handed out by `Catalog::fetch_candidates`. All state changes go
/// through the transition methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ReplicaId,
    pub scope: String,
    pub name: String,
    pub rse_id: RseId,

    /// Recorded physical location. When absent the PFN is derived from
    /// `path` and the endpoint's protocol at deletion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfn: Option<Pfn>,

    /// Location relative to the endpoint's protocol prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub bytes: u64,

    /// When the replica was marked obsolete. `None` means it is not a
    /// deletion candidate at all.
    #[serde(default)]
    pub tombstone: Option<DateTime<Utc>>,

    #[serde(default = "available")]
    pub state: ReplicaState,
    pub state_changed_at: DateTime<Utc>,

    #[serde(default)]
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn available() -> ReplicaState {
    ReplicaState::Available
}

impl Replica {
    pub fn new(
        id: ReplicaId,
        scope: impl Into<String>,
        name: impl Into<String>,
        rse_id: RseId,
        pfn: Pfn,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            scope: scope.into(),
            name: name.into(),
            rse_id,
            pfn: Some(pfn),
            path: None,
            bytes: 0,
            tombstone: None,
            state: ReplicaState::Available,
            state_changed_at: now,
            attempts: 0,
            last_error: None,
        }
    }

    /// A replica known only by its path under the endpoint prefix.
    pub fn at_path(
        id: ReplicaId,
        scope: impl Into<String>,
        name: impl Into<String>,
        rse_id: RseId,
        path: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            scope: scope.into(),
            name: name.into(),
            rse_id,
            pfn: None,
            path: Some(path.into()),
            bytes: 0,
            tombstone: None,
            state: ReplicaState::Available,
            state_changed_at: now,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_tombstone(mut self, tombstone: DateTime<Utc>) -> Self {
        self.tombstone = Some(tombstone);
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    /// `scope:name`, the logical identifier.
    pub fn did(&self) -> String {
        format!("{}:{}", self.scope, self.name)
    }

    /// Recorded PFN or path, for logs.
    pub fn location(&self) -> &str {
        match (&self.pfn, &self.path) {
            (Some(pfn), _) => pfn.as_str(),
            (None, Some(path)) => path,
            (None, None) => "",
        }
    }

    /// Can this replica be addressed with `scheme` on `rse`?
    pub fn reachable_via(&self, rse: &Rse, scheme: &str) -> bool {
        match &self.pfn {
            Some(pfn) => pfn.scheme() == scheme,
            None => rse.supports_scheme(scheme),
        }
    }

    /// The PFN to hand to a driver.
    ///
    /// A recorded PFN must belong to one of `rse`'s protocols. Otherwise the
    /// PFN is built from `path` and the protocol for `scheme`, or the
    /// endpoint's first protocol when no scheme is forced.
    pub fn resolve_pfn(&self, rse: &Rse, scheme: Option<&str>) -> Result<Pfn, PfnError> {
        if let Some(pfn) = &self.pfn {
            rse.check_pfn(pfn)?;
            return Ok(pfn.clone());
        }
        let path = self.path.as_deref().ok_or_else(|| PfnError::Unaddressable {
            replica: self.id.to_string(),
        })?;
        let protocol = match scheme {
            Some(scheme) => rse.protocol(scheme),
            None => rse.protocols.first(),
        };
        let protocol = protocol.ok_or_else(|| PfnError::NoProtocol {
            rse: rse.id.to_string(),
            scheme: scheme.unwrap_or("any").to_string(),
        })?;
        protocol.pfn_for(path)
    }

    /// Time spent in the current state.
    pub fn state_age(&self, now: DateTime<Utc>) -> Duration {
        now - self.state_changed_at
    }

    /// Is the claim on this replica old enough to be taken over?
    pub fn is_stale_claim(&self, now: DateTime<Utc>, delay: Duration) -> bool {
        self.state == ReplicaState::BeingDeleted && self.state_age(now) > delay
    }

    /// Is this available replica eligible under the given minimum tombstone age?
    ///
    /// Greedy deletion skips the age check but still needs a tombstone.
    pub fn is_expired(&self, now: DateTime<Utc>, minimum_age: Duration, greedy: bool) -> bool {
        if self.state != ReplicaState::Available {
            return false;
        }
        match self.tombstone {
            Some(_) if greedy => true,
            Some(tombstone) => now - tombstone >= minimum_age,
            None => false,
        }
    }

    /// Claim for deletion (increments attempts).
    pub fn begin_deletion(&mut self, now: DateTime<Utc>) -> Result<(), ReaperError> {
        self.transition(ReplicaState::BeingDeleted, now)?;
        self.attempts += 1;
        Ok(())
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> Result<(), ReaperError> {
        self.transition(ReplicaState::Deleted, now)?;
        self.last_error = None;
        Ok(())
    }

    pub fn mark_deletion_failed(
        &mut self,
        now: DateTime<Utc>,
        error: String,
    ) -> Result<(), ReaperError> {
        self.transition(ReplicaState::DeletionFailed, now)?;
        self.last_error = Some(error);
        Ok(())
    }

    /// Record a transient failure. The replica keeps its claim (and its
    /// claim timestamp) so that it is reclaimed once the claim goes stale.
    pub fn record_transient_failure(&mut self, error: String) -> Result<(), ReaperError> {
        if self.state != ReplicaState::BeingDeleted {
            return Err(ReaperError::InvalidTransition {
                replica: self.id,
                from: self.state,
                to: ReplicaState::BeingDeleted,
            });
        }
        self.last_error = Some(error);
        Ok(())
    }

    fn transition(&mut self, next: ReplicaState, now: DateTime<Utc>) -> Result<(), ReaperError> {
        if !self.state.can_transition_to(next) {
            return Err(ReaperError::InvalidTransition {
                replica: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.state_changed_at = now;
        Ok(())
    }
}
