//! Static registry of built-in actions
//!
//! Only actions referenced by the threshold configuration are constructed,
//! and each one must pass validation before it is handed to the monitor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::ActionSettings;

use super::{Action, ActionError, FileAction, LogAction, WebhookAction};

/// Names of all built-in actions, for `list-actions` and error messages
pub fn builtin_names() -> &'static [&'static str] {
    &["log", "file", "webhook"]
}

fn construct(name: &str, settings: &ActionSettings) -> Result<Arc<dyn Action>, ActionError> {
    match name {
        "log" => Ok(Arc::new(LogAction)),
        "file" => Ok(Arc::new(FileAction::new(
            settings.file_dir.clone(),
            settings.file_size_bytes,
        ))),
        "webhook" => Ok(Arc::new(WebhookAction::new(
            settings.webhook_url.clone(),
            Duration::from_millis(settings.webhook_timeout_ms),
        )?)),
        other => Err(ActionError::UnknownAction(other.to_string())),
    }
}

/// Build and validate the actions named in `required`. Duplicate names are
/// constructed once. Any unknown name or failed validation aborts startup.
pub fn build_registry(
    required: &[&str],
    settings: &ActionSettings,
) -> Result<HashMap<String, Arc<dyn Action>>, ActionError> {
    let mut registry: HashMap<String, Arc<dyn Action>> = HashMap::new();

    for name in required {
        if registry.contains_key(*name) {
            continue;
        }
        let action = construct(name, settings)?;
        action.validate_config()?;
        info!(action = %action.name(), "action loaded and validated");
        registry.insert((*name).to_string(), action);
    }

    Ok(registry)
}
