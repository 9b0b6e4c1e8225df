//! Phase tracking and the per-tick evaluation step

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::threshold::{ThresholdLevel, ThresholdPolicy, Tier};

/// Current severity phase. No terminal state; the machine runs for the
/// process lifetime and a restart always begins in `Quiescent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Quiescent,
    SoftActive,
    HardActive,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Quiescent => "quiescent",
            Phase::SoftActive => "soft_active",
            Phase::HardActive => "hard_active",
        }
    }
}

/// The single mutable record owned by the state machine
#[derive(Debug, Default)]
struct EvaluationState {
    soft_started_at: Option<Instant>,
    hard_started_at: Option<Instant>,
    /// When the tier last transitioned to active; basis for re-fire elapsed
    soft_activated_at: Option<Instant>,
    hard_activated_at: Option<Instant>,
    /// Whether a dispatch has succeeded for the tier this episode. Until it
    /// has, the action is retried on every eligible tick.
    soft_fired: bool,
    hard_fired: bool,
    /// Cooldowns survive a reset to Quiescent: they bound action frequency,
    /// not violation tracking
    soft_cooldown_until: Option<Instant>,
    hard_cooldown_until: Option<Instant>,
}

/// Evaluates one sample per tick against the policy and fires tier actions
/// through the dispatcher. Exclusively owned and driven by the control loop;
/// `now` is injected so tests control elapsed time directly.
pub struct StateMachine {
    policy: ThresholdPolicy,
    phase: Phase,
    state: EvaluationState,
}

impl StateMachine {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Quiescent,
            state: EvaluationState::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn violated(&self, level: &ThresholdLevel, value: f64) -> bool {
        self.policy.operator.is_violated(value, level.trigger)
    }

    fn in_cooldown(until: Option<Instant>, now: Instant) -> bool {
        matches!(until, Some(t) if now < t)
    }

    /// Arm the tier's cooldown after a successful action. Zero cooldown
    /// never arms, so the action fires at most once per violation episode.
    fn arm_cooldown(&mut self, tier: Tier, level: &ThresholdLevel, now: Instant) {
        if level.cooldown.is_zero() {
            return;
        }
        let until = now + level.cooldown;
        match tier {
            Tier::Soft => self.state.soft_cooldown_until = Some(until),
            Tier::Hard => self.state.hard_cooldown_until = Some(until),
        }
        info!(tier = tier.label(), cooldown_secs = level.cooldown.as_secs_f64(), "entering cooldown after action");
    }

    fn reset_to_quiescent(&mut self) {
        self.phase = Phase::Quiescent;
        self.state.soft_started_at = None;
        self.state.hard_started_at = None;
        self.state.soft_activated_at = None;
        self.state.hard_activated_at = None;
        self.state.soft_fired = false;
        self.state.hard_fired = false;
    }

    /// Advance the machine one tick with an observed (or substituted) value
    pub async fn evaluate(&mut self, value: f64, now: Instant, dispatcher: &Dispatcher) {
        match self.phase {
            Phase::Quiescent => self.step_quiescent(value, now, dispatcher).await,
            Phase::SoftActive => self.step_soft_active(value, now, dispatcher).await,
            Phase::HardActive => self.step_hard_active(value, now, dispatcher).await,
        }
    }

    async fn step_quiescent(&mut self, value: f64, now: Instant, dispatcher: &Dispatcher) {
        let Some(soft) = self.policy.soft.clone() else {
            // Hard-only configurations never leave Quiescent: the hard tier
            // is reachable only through an active soft tier
            return;
        };

        if !self.violated(&soft, value) {
            if self.state.soft_started_at.take().is_some() {
                info!(value, threshold = %self.policy.descriptor(&soft), "soft threshold no longer crossed, timer reset");
            }
            return;
        }

        let Some(started) = self.state.soft_started_at else {
            self.state.soft_started_at = Some(now);
            info!(value, threshold = %self.policy.descriptor(&soft), "soft threshold crossed");
            return;
        };

        let elapsed = now.duration_since(started);
        if elapsed < soft.sustain {
            return;
        }

        if Self::in_cooldown(self.state.soft_cooldown_until, now) {
            debug!(tier = "soft", "sustain met but tier in cooldown, suppressing");
            return;
        }

        warn!(
            value,
            threshold = %self.policy.descriptor(&soft),
            elapsed_secs = elapsed.as_secs_f64(),
            "soft threshold exceeded for sustain duration"
        );
        self.phase = Phase::SoftActive;
        self.state.soft_activated_at = Some(now);
        self.state.soft_started_at = None;

        let descriptor = self.policy.descriptor(&soft);
        if dispatcher.dispatch(&soft, Tier::Soft, &descriptor, value, elapsed).await {
            self.state.soft_fired = true;
            self.arm_cooldown(Tier::Soft, &soft, now);
        }
    }

    async fn step_soft_active(&mut self, value: f64, now: Instant, dispatcher: &Dispatcher) {
        let Some(soft) = self.policy.soft.clone() else {
            self.reset_to_quiescent();
            return;
        };

        if !self.violated(&soft, value) {
            info!(value, threshold = %self.policy.descriptor(&soft), "soft threshold no longer crossed");
            self.reset_to_quiescent();
            return;
        }

        // Soft tier logic first, then hard: the hard tier is only considered
        // once the soft tier is (and stays) active
        if let Some(hard) = self.policy.hard.clone() {
            if self.violated(&hard, value) {
                match self.state.hard_started_at {
                    None => {
                        self.state.hard_started_at = Some(now);
                        info!(value, threshold = %self.policy.descriptor(&hard), "hard threshold crossed");
                    }
                    Some(started) => {
                        let elapsed = now.duration_since(started);
                        if elapsed >= hard.sustain && !Self::in_cooldown(self.state.hard_cooldown_until, now) {
                            warn!(
                                value,
                                threshold = %self.policy.descriptor(&hard),
                                elapsed_secs = elapsed.as_secs_f64(),
                                "hard threshold exceeded for sustain duration"
                            );
                            self.phase = Phase::HardActive;
                            self.state.hard_activated_at = Some(now);
                            self.state.hard_started_at = None;

                            let descriptor = self.policy.descriptor(&hard);
                            if dispatcher.dispatch(&hard, Tier::Hard, &descriptor, value, elapsed).await {
                                self.state.hard_fired = true;
                                self.arm_cooldown(Tier::Hard, &hard, now);
                            }
                            return;
                        }
                    }
                }
            } else if self.state.hard_started_at.take().is_some() {
                info!(value, threshold = %self.policy.descriptor(&hard), "hard threshold no longer crossed, timer reset");
            }
        }

        // Until a dispatch has succeeded this episode the soft action is
        // retried every tick; after a success it re-fires only once the
        // cooldown lapses with the tier still violated
        let due = if self.state.soft_fired {
            matches!(self.state.soft_cooldown_until, Some(until) if now >= until)
        } else {
            true
        };
        if due {
            let elapsed = self
                .state
                .soft_activated_at
                .map(|t| now.duration_since(t))
                .unwrap_or_default();
            let descriptor = self.policy.descriptor(&soft);
            if dispatcher.dispatch(&soft, Tier::Soft, &descriptor, value, elapsed).await {
                self.state.soft_fired = true;
                self.arm_cooldown(Tier::Soft, &soft, now);
            }
        }
    }

    async fn step_hard_active(&mut self, value: f64, now: Instant, dispatcher: &Dispatcher) {
        let (Some(soft), Some(hard)) = (self.policy.soft.clone(), self.policy.hard.clone()) else {
            self.reset_to_quiescent();
            return;
        };

        // Either condition clearing ends the episode. A cleared soft tier
        // implies the hard tier cannot remain active (nesting invariant), so
        // the phase returns to Quiescent, never to SoftActive.
        if !self.violated(&soft, value) || !self.violated(&hard, value) {
            info!(value, "threshold conditions cleared");
            self.reset_to_quiescent();
            return;
        }

        let due = if self.state.hard_fired {
            matches!(self.state.hard_cooldown_until, Some(until) if now >= until)
        } else {
            true
        };
        if due {
            let elapsed = self
                .state
                .hard_activated_at
                .map(|t| now.duration_since(t))
                .unwrap_or_default();
            let descriptor = self.policy.descriptor(&hard);
            if dispatcher.dispatch(&hard, Tier::Hard, &descriptor, value, elapsed).await {
                self.state.hard_fired = true;
                self.arm_cooldown(Tier::Hard, &hard, now);
            }
        }
    }

    /// Degraded-input step for `assume_breached` mode: advance one phase-step
    /// toward violation for whichever tier is reachable from the current
    /// phase, honoring sustain and cooldown as usual. Actions fire with
    /// value 0 and zero elapsed since no real observation exists.
    pub async fn assume_breached(&mut self, now: Instant, dispatcher: &Dispatcher) {
        match self.phase {
            Phase::Quiescent => {
                let Some(soft) = self.policy.soft.clone() else {
                    debug!("assume_breached with no soft tier configured, nothing to advance");
                    return;
                };

                let Some(started) = self.state.soft_started_at else {
                    self.state.soft_started_at = Some(now);
                    info!("assuming soft threshold breached");
                    return;
                };

                if now.duration_since(started) < soft.sustain
                    || Self::in_cooldown(self.state.soft_cooldown_until, now)
                {
                    return;
                }

                warn!("assumed soft breach sustained, activating");
                self.phase = Phase::SoftActive;
                self.state.soft_activated_at = Some(now);
                self.state.soft_started_at = None;

                let descriptor = self.policy.descriptor(&soft);
                if dispatcher.dispatch(&soft, Tier::Soft, &descriptor, 0.0, Duration::ZERO).await {
                    self.state.soft_fired = true;
                    self.arm_cooldown(Tier::Soft, &soft, now);
                }
            }
            Phase::SoftActive => {
                let Some(hard) = self.policy.hard.clone() else {
                    return;
                };

                let Some(started) = self.state.hard_started_at else {
                    self.state.hard_started_at = Some(now);
                    info!("assuming hard threshold breached");
                    return;
                };

                if now.duration_since(started) < hard.sustain
                    || Self::in_cooldown(self.state.hard_cooldown_until, now)
                {
                    return;
                }

                warn!("assumed hard breach sustained, activating");
                self.phase = Phase::HardActive;
                self.state.hard_activated_at = Some(now);
                self.state.hard_started_at = None;

                let descriptor = self.policy.descriptor(&hard);
                if dispatcher.dispatch(&hard, Tier::Hard, &descriptor, 0.0, Duration::ZERO).await {
                    self.state.hard_fired = true;
                    self.arm_cooldown(Tier::Hard, &hard, now);
                }
            }
            Phase::HardActive => {
                // Both tiers already active, nothing further to advance toward
            }
        }
    }
}
