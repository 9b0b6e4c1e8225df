//! Leadership-gated action dispatch
//!
//! The state machine decides *that* a tier fired; this layer decides whether
//! this replica is allowed to act on it. Phase transitions happen on every
//! replica regardless — only the side effect is suppressed off-leader.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::actions::ActionContext;
use crate::leadership::LeadershipHandle;
use crate::threshold::{ThresholdLevel, Tier};

pub struct Dispatcher {
    leadership: LeadershipHandle,
    metric_name: String,
}

impl Dispatcher {
    pub fn new(leadership: LeadershipHandle, metric_name: String) -> Self {
        Self { leadership, metric_name }
    }

    /// Invoke the tier's action if this replica is the leader.
    ///
    /// Returns true only on a successful execution — the caller arms the
    /// tier's cooldown on that signal. A failure is logged and leaves the
    /// cooldown unarmed so the next eligible tick retries; there is no
    /// synchronous retry within the tick.
    pub async fn dispatch(
        &self,
        level: &ThresholdLevel,
        tier: Tier,
        descriptor: &str,
        value: f64,
        elapsed: Duration,
    ) -> bool {
        if !self.leadership.is_leader() {
            debug!(
                tier = tier.label(),
                action = level.action.name(),
                "not leader, suppressing action"
            );
            return false;
        }

        let ctx = ActionContext {
            metric_name: self.metric_name.clone(),
            value,
            threshold: descriptor.to_string(),
            tier: tier.label(),
            elapsed,
        };

        match level.action.execute(&ctx).await {
            Ok(()) => {
                info!(
                    tier = tier.label(),
                    action = level.action.name(),
                    value,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "action executed"
                );
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    tier = tier.label(),
                    action = level.action.name(),
                    "failed to execute action"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingAction {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingAction {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Action for Arc<CountingAction> {
        async fn execute(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ActionError::Failed("boom".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn validate_config(&self) -> Result<(), ActionError> {
            Ok(())
        }
    }

    fn level(action: Arc<CountingAction>) -> ThresholdLevel {
        ThresholdLevel {
            trigger: 80.0,
            sustain: Duration::from_secs(5),
            cooldown: Duration::ZERO,
            action: Arc::new(action),
        }
    }

    #[tokio::test]
    async fn test_leader_executes_and_reports_success() {
        let action = CountingAction::new(false);
        let dispatcher = Dispatcher::new(LeadershipHandle::new(true), "m".to_string());

        let armed = dispatcher
            .dispatch(&level(action.clone()), Tier::Soft, ">80", 90.0, Duration::from_secs(6))
            .await;

        assert!(armed);
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_leader_suppresses_side_effect() {
        let action = CountingAction::new(false);
        let dispatcher = Dispatcher::new(LeadershipHandle::new(false), "m".to_string());

        let armed = dispatcher
            .dispatch(&level(action.clone()), Tier::Soft, ">80", 90.0, Duration::from_secs(6))
            .await;

        assert!(!armed);
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_arm_cooldown() {
        let action = CountingAction::new(true);
        let dispatcher = Dispatcher::new(LeadershipHandle::new(true), "m".to_string());

        let armed = dispatcher
            .dispatch(&level(action.clone()), Tier::Hard, ">100", 110.0, Duration::from_secs(6))
            .await;

        assert!(!armed);
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }
}
