//! Action interface and built-in implementations
//!
//! Actions are the side effects fired when a threshold tier activates. Each
//! built-in is selected by name from configuration; only referenced actions
//! are constructed, and every one validates its own settings at load time
//! before the monitor starts.

mod file;
mod log;
mod registry;
mod webhook;

pub use file::FileAction;
pub use log::LogAction;
pub use registry::{build_registry, builtin_names};
pub use webhook::WebhookAction;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by action validation or execution
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Invalid action configuration for '{action}': {message}")]
    InvalidConfig { action: String, message: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Action failed: {0}")]
    Failed(String),
}

/// Bounded context handed to an action when its tier fires
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Name of the monitored metric
    pub metric_name: String,

    /// Value that triggered the action (0 under assume_breached)
    pub value: f64,

    /// Human-readable tier descriptor, e.g. ">80"
    pub threshold: String,

    /// Tier label, "soft" or "hard"
    pub tier: &'static str,

    /// How long the violation had been sustained at fire time
    pub elapsed: Duration,
}

/// The capability set every action implements
#[async_trait]
pub trait Action: Send + Sync + std::fmt::Debug {
    /// Fire the action. A failure is logged by the dispatcher and does not
    /// arm the tier's cooldown; the next eligible tick retries.
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError>;

    /// Stable name the action is referenced by in configuration
    fn name(&self) -> &str;

    /// Validate settings at load time, before the action is registered.
    /// A failure here prevents startup.
    fn validate_config(&self) -> Result<(), ActionError>;
}
