//! Cache-aside synchronization of the feed resources.
//!
//! Each fetch cycle emits at most two results:
//!
//! ```text
//!  snapshot present ──▶ Success(provenance = none)      (immediate)
//!  network ok       ──▶ Success(provenance = Network)   (terminal)
//!  network failed   ──▶ Success(provenance = Cache)     (terminal, snapshot existed)
//!                   └─▶ Failure(message)                (terminal, no snapshot)
//! ```

pub mod resource;
pub mod synchronizer;

pub use resource::{Competitions, Events, Resource, Sports};
pub use synchronizer::{local_clock, Clock, SyncCycle, Synchronizer};

use serde::Serialize;

/// Where a successful result's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Network failed, showing the persisted snapshot
    Cache,
    /// Fresh from the remote feed
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncResult<T> {
    Success {
        data: T,
        /// `None` for the immediate snapshot emission while the network
        /// attempt is still outstanding
        provenance: Option<Provenance>,
    },
    Failure {
        message: String,
    },
}

impl<T> SyncResult<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            SyncResult::Success { data, .. } => Some(data),
            SyncResult::Failure { .. } => None,
        }
    }

    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            SyncResult::Success { provenance, .. } => *provenance,
            SyncResult::Failure { .. } => None,
        }
    }

    /// Failure message, for logging
    pub fn message(&self) -> Option<&str> {
        match self {
            SyncResult::Success { .. } => None,
            SyncResult::Failure { message } => Some(message),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncResult::Failure { .. })
    }

    pub fn is_from_cache(&self) -> bool {
        self.provenance() == Some(Provenance::Cache)
    }

    /// Terminal results close a cycle; only the immediate snapshot emission
    /// is non-terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            SyncResult::Success {
                provenance: None,
                ..
            }
        )
    }
}
