//! File action: creates a fixed-size file per threshold event

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::info;

use super::{Action, ActionContext, ActionError};

/// Creates `metric_<name>_<unix-ts>.bin` of a configured size in a configured
/// directory. The original use case is forcing storage churn so a downstream
/// system reacts; it doubles as an easily observable action in tests.
#[derive(Debug)]
pub struct FileAction {
    output_dir: PathBuf,
    file_size: u64,
}

impl FileAction {
    pub fn new(output_dir: PathBuf, file_size: u64) -> Self {
        Self { output_dir, file_size }
    }
}

#[async_trait]
impl Action for FileAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = self.output_dir.join(format!("metric_{}_{}.bin", ctx.metric_name, ts));

        let size = self.file_size;
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ActionError> {
            let file = std::fs::File::create(&target)?;
            file.set_len(size)?;
            file.sync_all()?;
            Ok(())
        })
        .await
        .map_err(|e| ActionError::Failed(format!("file action task panicked: {}", e)))??;

        info!(file = %path.display(), size = self.file_size, "created file");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }

    fn validate_config(&self) -> Result<(), ActionError> {
        if self.file_size == 0 {
            return Err(ActionError::InvalidConfig {
                action: "file".to_string(),
                message: "file-size-bytes must be greater than zero".to_string(),
            });
        }
        std::fs::create_dir_all(&self.output_dir).map_err(|e| ActionError::InvalidConfig {
            action: "file".to_string(),
            message: format!("cannot create output directory {}: {}", self.output_dir.display(), e),
        })?;
        Ok(())
    }
}
