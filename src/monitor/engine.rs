//! Per-tick orchestration
//!
//! Each tick acquires one sample under a bounded timeout, applies the
//! missing-value policy when the backend has no data, and hands the result
//! to the state machine. Sample failures never stop the loop; they skip the
//! tick and the next interval proceeds.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::MissingValueMode;
use crate::dispatch::Dispatcher;
use crate::sampler::Sampler;
use crate::threshold::StateMachine;

pub struct MonitorEngine {
    sampler: Box<dyn Sampler>,
    machine: StateMachine,
    dispatcher: Dispatcher,
    interval: Duration,
    sample_timeout: Duration,
    missing_value: MissingValueMode,
    /// Most recent real observation, for `last_value` substitution
    last_value: Option<f64>,
}

impl MonitorEngine {
    pub fn new(
        sampler: Box<dyn Sampler>,
        machine: StateMachine,
        dispatcher: Dispatcher,
        interval: Duration,
        sample_timeout: Duration,
        missing_value: MissingValueMode,
    ) -> Self {
        Self {
            sampler,
            machine,
            dispatcher,
            interval,
            sample_timeout,
            missing_value,
            last_value: None,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            query = %self.sampler.query(),
            interval_ms = self.interval.as_millis() as u64,
            "monitor loop started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("monitor loop stopping");
                    return;
                }
            }
        }
    }

    async fn tick(&mut self) {
        let sampled = match tokio::time::timeout(self.sample_timeout, self.sampler.sample()).await {
            Ok(Ok(sampled)) => sampled,
            Ok(Err(e)) => {
                warn!(error = %e, query = %self.sampler.query(), "sample failed, skipping tick");
                return;
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.sample_timeout.as_millis() as u64,
                    query = %self.sampler.query(),
                    "sample timed out, skipping tick"
                );
                return;
            }
        };

        let now = Instant::now();

        let value = match sampled {
            Some(value) => {
                self.last_value = Some(value);
                value
            }
            None => match self.missing_value {
                MissingValueMode::LastValue => match self.last_value {
                    Some(value) => {
                        debug!(value, "no data, substituting last observed value");
                        value
                    }
                    None => {
                        debug!("no data and nothing previously observed, skipping tick");
                        return;
                    }
                },
                MissingValueMode::Zero => {
                    debug!("no data, substituting zero");
                    0.0
                }
                MissingValueMode::AssumeBreached => {
                    debug!("no data, assuming breach");
                    self.machine.assume_breached(now, &self.dispatcher).await;
                    return;
                }
            },
        };

        debug!(value, phase = self.machine.phase().label(), "evaluating sample");
        self.machine.evaluate(value, now, &self.dispatcher).await;
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> crate::threshold::Phase {
        self.machine.phase()
    }

    #[cfg(test)]
    pub(crate) async fn tick_once(&mut self) {
        self.tick().await;
    }
}
