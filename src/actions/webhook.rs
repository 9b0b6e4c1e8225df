//! Webhook action: POSTs the threshold event to an external endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{Action, ActionContext, ActionError};

/// Hands the event to an out-of-process receiver. This is the boundary for
/// side effects that do not belong in the sidecar itself (paging, scaling a
/// cloud resource, opening a ticket).
#[derive(Debug)]
pub struct WebhookAction {
    url: String,
    client: reqwest::Client,
}

impl WebhookAction {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Action for WebhookAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let payload = json!({
            "metric_name": ctx.metric_name,
            "value": ctx.value,
            "threshold": ctx.threshold,
            "tier": ctx.tier,
            "elapsed_secs": ctx.elapsed.as_secs_f64(),
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActionError::Failed(format!(
                "webhook returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        info!(url = %self.url, status = %status, "webhook delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self) -> Result<(), ActionError> {
        if self.url.is_empty() {
            return Err(ActionError::InvalidConfig {
                action: "webhook".to_string(),
                message: "webhook-url is required".to_string(),
            });
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ActionError::InvalidConfig {
                action: "webhook".to_string(),
                message: format!("webhook-url must be http(s), got: {}", self.url),
            });
        }
        Ok(())
    }
}
