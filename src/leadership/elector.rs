//! The lease renewal loop
//!
//! Periodically acquires or renews the lease, keeps the leadership flag
//! current, and resolves with the reason it stopped. Losing a lease we held
//! is a fence: the process must not keep running beside a new leader, so the
//! outcome propagates to `main` which exits non-zero.

use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::lease::LeaseBackend;
use super::LeadershipHandle;

/// Why the elector stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Held leadership and lost it; the process must terminate
    Fenced,
    /// Clean shutdown requested; lease released
    Shutdown,
}

/// Lease protocol timings. The defaults mirror the usual lease ratios:
/// duration > renew deadline > retry period.
#[derive(Debug, Clone)]
pub struct ElectorConfig {
    /// How long an unrenewed lease remains valid
    pub lease_duration: Duration,

    /// How long a holder keeps trying to renew before giving up leadership
    pub renew_deadline: Duration,

    /// Interval between acquire/renew attempts
    pub retry_period: Duration,

    /// This replica's identity in the lease record
    pub identity: String,
}

impl ElectorConfig {
    pub fn with_identity(identity: String) -> Self {
        Self {
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            identity,
        }
    }
}

pub struct LeaderElector {
    backend: Box<dyn LeaseBackend>,
    config: ElectorConfig,
    handle: LeadershipHandle,
}

impl LeaderElector {
    pub fn new(backend: Box<dyn LeaseBackend>, config: ElectorConfig, handle: LeadershipHandle) -> Self {
        Self { backend, config, handle }
    }

    /// Run until fenced or shut down. Sets the leadership flag as a side
    /// effect; never sets it true except on a successful self-renewal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ElectionOutcome {
        let mut held = false;
        let mut last_renewal: Option<Instant> = None;
        let mut observed_holder: Option<String> = None;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(jittered(self.config.retry_period)) => {}
                _ = shutdown.changed() => {
                    self.handle.set(false);
                    if let Err(e) = self.backend.release(&self.config.identity) {
                        warn!(error = %e, "failed to release lease on shutdown");
                    }
                    info!("leader elector stopped");
                    return ElectionOutcome::Shutdown;
                }
            }

            match self
                .backend
                .try_acquire_or_renew(&self.config.identity, self.config.lease_duration)
            {
                Ok(obs) if obs.held_by_self => {
                    last_renewal = Some(Instant::now());
                    if !held {
                        info!(identity = %self.config.identity, "gained leadership; actions will execute from this replica");
                    }
                    held = true;
                    self.handle.set(true);
                    observed_holder = Some(obs.holder);
                }
                Ok(obs) => {
                    self.handle.set(false);
                    if observed_holder.as_deref() != Some(obs.holder.as_str()) {
                        info!(leader = %obs.holder, "current leader");
                        observed_holder = Some(obs.holder);
                    }
                    if held {
                        warn!("lost leadership; terminating so another instance takes over");
                        return ElectionOutcome::Fenced;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "lease renewal attempt failed");
                    if held {
                        let lapsed = last_renewal
                            .map(|t| t.elapsed() >= self.config.renew_deadline)
                            .unwrap_or(true);
                        if lapsed {
                            self.handle.set(false);
                            warn!(error = %e, "renew deadline exceeded while holding lease; terminating");
                            return ElectionOutcome::Fenced;
                        }
                    }
                }
            }
        }
    }
}

fn jittered(period: Duration) -> Duration {
    // Up to +20% so replicas sharing a start time do not stampede the store
    let factor: f64 = rand::rng().random_range(1.0..1.2);
    period.mul_f64(factor)
}
