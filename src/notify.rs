use async_trait::async_trait;
use uuid::Uuid;

// ============================================================================
// Notification Sink Collaborator
// ============================================================================
//
// Fire-and-forget: the orchestrator logs delivery failures and never lets
// them fail the parent operation. The actual transport (mail, push, in-app)
// lives outside this service.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("notification could not be delivered: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        link: &str,
    ) -> Result<(), NotifyError>;
}

/// Sink that only writes the notification to the log. Used in dev mode and
/// wherever no real transport is wired.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        link: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %user_id,
            title = title,
            message = message,
            link = link,
            "notification emitted"
        );
        Ok(())
    }
}
