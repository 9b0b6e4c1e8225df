//! metricwatch - threshold-monitoring sidecar
//!
//! Samples a numeric metric on a fixed interval, tracks sustained violation
//! of configured soft and hard severity tiers, and fires an external action
//! exactly once per violation episode from the single elected leader among
//! redundant replicas, suppressing repeats for a cooldown window.
//!
//! # Core Concepts
//!
//! - **Sustain before fire**: a tier activates only after its threshold has
//!   been continuously violated for the configured sustain duration
//! - **Nesting**: the hard tier can only activate while the soft tier is
//!   already active
//! - **Leader-gated side effects**: phase tracking runs on every replica,
//!   but only the leaseholder executes actions
//! - **Fail-open startup, fail-fast fencing**: an unreachable coordination
//!   store degrades to single-instance mode; losing held leadership exits
//!   the process
//!
//! # Modules
//!
//! - [`threshold`] - The violation state machine
//! - [`leadership`] - Lease-based leader election
//! - [`sampler`] - Metric acquisition from a Prometheus-compatible backend
//! - [`actions`] - Built-in actions fired on tier activation
//! - [`monitor`] - The control loop tying it all together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod actions;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod leadership;
pub mod monitor;
pub mod sampler;
pub mod threshold;

// Re-export commonly used types
pub use actions::{Action, ActionContext, ActionError, build_registry, builtin_names};
pub use config::{Config, MissingValueMode};
pub use dispatch::Dispatcher;
pub use leadership::{ElectionOutcome, LeadershipHandle};
pub use monitor::MonitorEngine;
pub use sampler::{PrometheusSampler, SampleError, Sampler};
pub use threshold::{Phase, StateMachine, ThresholdLevel, ThresholdOperator, ThresholdPolicy, Tier};
