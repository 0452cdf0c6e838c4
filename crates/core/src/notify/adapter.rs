//! Outbound channel adapter interface
//!
//! Real deployments plug SMTP / SMS / HTTP delivery in here. The stub
//! accepts everything so the queue drains in the reference deployment.

use async_trait::async_trait;
use tracing::info;

use crate::Result;

use super::model::{NotificationChannel, NotificationEvent};

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn deliver(
        &self,
        channel: &NotificationChannel,
        event: &NotificationEvent,
    ) -> Result<()>;
}

pub struct StubChannelAdapter;

#[async_trait]
impl ChannelAdapter for StubChannelAdapter {
    async fn deliver(
        &self,
        channel: &NotificationChannel,
        event: &NotificationEvent,
    ) -> Result<()> {
        info!(
            "Delivering notification {} via {:?} channel {}",
            event.id, channel.channel_type, channel.id
        );
        Ok(())
    }
}
