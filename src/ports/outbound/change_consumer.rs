use crate::shared::Result;
use crate::tracking::domain::ChangeEvent;
use async_trait::async_trait;

/// ChangeConsumer port for components reacting to committed store mutations
///
/// Delivery is at-least-once: consumers must tolerate seeing the same event
/// more than once.
#[async_trait]
pub trait ChangeConsumer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Handles one committed change event
    ///
    /// # Errors
    /// An error stops the current delivery pass; the event stays in the
    /// outbox and is delivered again on the next pass.
    async fn on_change(&self, event: &ChangeEvent) -> Result<()>;

    /// Handles a batch of committed events in commit order
    ///
    /// Consumers that can merge related work override this; the default
    /// delivers each event in turn.
    async fn on_changes(&self, events: &[ChangeEvent]) -> Result<()> {
        for event in events {
            self.on_change(event).await?;
        }
        Ok(())
    }
}
