//! Threshold state machine
//!
//! Tracks sustained violation of the soft and hard severity tiers with
//! hysteresis (violation timers reset on any dip below trigger), per-tier
//! cooldowns after successful actions, and the nesting invariant: the hard
//! tier can only activate while the soft tier is already active.

mod policy;
mod state;

pub use policy::{ThresholdLevel, ThresholdOperator, ThresholdPolicy, Tier};
pub use state::{Phase, StateMachine};
