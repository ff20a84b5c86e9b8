use tracing::info;

use super::Sink;
use crate::error::PublishError;
use crate::window::SealedWindow;

/// Writes each window as one JSON log event. Useful without a downstream store.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, window: &SealedWindow) -> Result<(), PublishError> {
        let body = serde_json::to_string(window).map_err(|e| PublishError::Encode(e.to_string()))?;
        info!(
            sink = "log",
            window_id = window.id(),
            keys = window.aggregates().len(),
            observations = window.observations(),
            window = %body,
            "window aggregates"
        );
        Ok(())
    }
}
