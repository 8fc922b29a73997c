// Per-recipient notification of newly flagged meter events
use std::sync::Arc;

use crate::application::repositories::{EventNotifier, MeterEventRepository, RecipientRepository};

/// Diffs each recipient's last-notified position against the newest flagged
/// event id and sends at most one notification per recipient per round. The
/// persisted position advances only after a send attempt returned Ok, so a
/// failed delivery is retried on the next round; delivery is best-effort,
/// never exactly-once.
pub struct MeterEventNotifier {
    meter_event_repository: Arc<dyn MeterEventRepository>,
    recipient_repository: Arc<dyn RecipientRepository>,
    notifier: Arc<dyn EventNotifier>,
}

impl MeterEventNotifier {
    pub fn new(
        meter_event_repository: Arc<dyn MeterEventRepository>,
        recipient_repository: Arc<dyn RecipientRepository>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            meter_event_repository,
            recipient_repository,
            notifier,
        }
    }

    pub async fn notify_on_new_events(&self) -> anyhow::Result<()> {
        let Some(newest_id) = self.meter_event_repository.get_max_flagged_event_id().await? else {
            return Ok(());
        };
        let recipients = self
            .recipient_repository
            .get_recipients_with_last_notified_position()
            .await?;
        for (recipient, last_notified) in recipients {
            if last_notified.is_some_and(|position| position >= newest_id) {
                continue;
            }
            match self.notifier.notify(&recipient, newest_id).await {
                Ok(()) => {
                    self.recipient_repository
                        .set_last_notified_position(&recipient, newest_id)
                        .await?;
                }
                Err(error) => {
                    tracing::warn!(
                        "notification to '{}' failed, will retry next round: {:#}",
                        recipient.name,
                        error
                    );
                }
            }
        }
        Ok(())
    }
}
