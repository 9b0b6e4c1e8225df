//! Leadership coordination
//!
//! Exactly one replica among those sharing a lock identity may execute
//! actions at a time. Leadership is a renewable, time-bounded lease held
//! against a shared coordination store; the current verdict is a single
//! atomic boolean written by the elector task and read by the dispatcher.
//!
//! Failure posture: at startup every coordination problem degrades to
//! single-instance mode (flag true, warning logged). Once leadership has
//! been held, losing it is fatal by design: the elector resolves with
//! [`ElectionOutcome::Fenced`] and the process exits non-zero so an
//! orchestrator can restart it cleanly.

mod elector;
mod lease;

pub use elector::{ElectionOutcome, ElectorConfig, LeaderElector};
pub use lease::{FileLeaseBackend, LeaseBackend, LeaseError, LeaseObservation, LeaseRecord};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::LeadershipConfig;

/// Cloneable view of the process-wide "am I leader" fact.
///
/// Single writer (the elector task), any number of readers. There is no
/// compound invariant tying this to other state, so a plain atomic suffices.
#[derive(Clone, Debug)]
pub struct LeadershipHandle {
    flag: Arc<AtomicBool>,
}

impl LeadershipHandle {
    pub fn new(initial: bool) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(initial)),
        }
    }

    /// Latest known leadership verdict
    pub fn is_leader(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, value: bool) {
        self.flag.store(value, Ordering::SeqCst);
    }
}

/// Identity for this replica: pod/host name when available, otherwise random
pub fn replica_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("mw-{}", uuid::Uuid::new_v4()))
}

/// Start leadership coordination according to configuration.
///
/// Returns the handle the dispatcher reads, plus the elector task when the
/// lease protocol is actually running. When coordination is disabled or the
/// store is unusable, the handle is unconditionally true and no task exists
/// (single-instance mode).
pub fn start(
    config: &LeadershipConfig,
    shutdown: watch::Receiver<bool>,
) -> (LeadershipHandle, Option<JoinHandle<ElectionOutcome>>) {
    if !config.enabled {
        info!("leader election disabled, executing actions on every replica");
        return (LeadershipHandle::new(true), None);
    }

    let backend = FileLeaseBackend::new(config.lock_dir.join(&config.lock_name));
    if let Err(e) = backend.check_available() {
        warn!(error = %e, "coordination store unavailable, assuming single replica");
        return (LeadershipHandle::new(true), None);
    }

    let identity = replica_identity();
    let handle = LeadershipHandle::new(false);
    let elector = LeaderElector::new(
        Box::new(backend),
        ElectorConfig::with_identity(identity),
        handle.clone(),
    );

    let task = tokio::spawn(elector.run(shutdown));
    (handle, Some(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_shared_across_clones() {
        let handle = LeadershipHandle::new(false);
        let reader = handle.clone();

        assert!(!reader.is_leader());
        handle.set(true);
        assert!(reader.is_leader());
        handle.set(false);
        assert!(!reader.is_leader());
    }

    #[test]
    fn test_replica_identity_is_nonempty() {
        assert!(!replica_identity().is_empty());
    }
}
