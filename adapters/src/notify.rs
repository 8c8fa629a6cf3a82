//! Notification sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use wd_core::traits::Notifier;
use wd_core::types::WorkspaceId;

/// Logs notifications instead of delivering them. The default wiring
/// until a Slack/webhook channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, workspace_id: WorkspaceId, message: &str) -> Result<(), String> {
        tracing::info!("notification workspace={workspace_id}: {message}");
        Ok(())
    }
}

/// Captures notifications for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(WorkspaceId, String)>>
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(WorkspaceId, String)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, workspace_id: WorkspaceId, message: &str) -> Result<(), String> {
        self.messages.lock().push((workspace_id, message.to_string()));
        Ok(())
    }
}
