//! Notification queue drain

use tracing::{info, warn};

use crate::state::AppState;

const DRAIN_BATCH: usize = 100;

/// Drain up to 100 queued notifications, oldest first. Adapter failures
/// move the row to FAILED and never surface.
pub async fn run_drain(state: &AppState) -> (usize, usize) {
    let events = state.notify_store().queued_events(DRAIN_BATCH).await;
    let mut sent = 0;
    let mut failed = 0;

    for event in events {
        let channel = match state.notify_store().channel(event.channel_id).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!("Notification {} has no channel: {}", event.id, err);
                if let Err(err) = state
                    .notify_store()
                    .mark_failed(event.id, "channel missing".to_string())
                    .await
                {
                    warn!("Failed to mark notification {}: {}", event.id, err);
                }
                failed += 1;
                continue;
            }
        };

        match state.channel_adapter().deliver(&channel, &event).await {
            Ok(()) => {
                if let Err(err) = state.notify_store().mark_sent(event.id).await {
                    warn!("Failed to mark notification {} sent: {}", event.id, err);
                } else {
                    sent += 1;
                }
            }
            Err(err) => {
                if let Err(err) = state
                    .notify_store()
                    .mark_failed(event.id, err.to_string())
                    .await
                {
                    warn!("Failed to mark notification {} failed: {}", event.id, err);
                }
                failed += 1;
            }
        }
    }

    if sent + failed > 0 {
        info!("Notification drain: {} sent, {} failed", sent, failed);
    }
    (sent, failed)
}

pub fn start(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            run_drain(&state).await;
        }
    });
}
