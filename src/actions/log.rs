//! Log action: records the threshold event and nothing else

use async_trait::async_trait;
use tracing::info;

use super::{Action, ActionContext, ActionError};

/// The simplest built-in: emits a structured log line when a tier fires.
/// Useful as a dry-run action and as the default for the soft tier.
#[derive(Debug, Default)]
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        info!(
            metric_name = %ctx.metric_name,
            value = ctx.value,
            threshold = %ctx.threshold,
            tier = ctx.tier,
            elapsed_secs = ctx.elapsed.as_secs_f64(),
            "threshold action executed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }

    fn validate_config(&self) -> Result<(), ActionError> {
        // No required configuration
        Ok(())
    }
}
