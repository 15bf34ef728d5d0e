use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub user_id: String,
    pub notification: Notification,
}

/// Forwards notifications to a channel drained by the transport.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, user_id: &str, notification: Notification) -> Result<()> {
        self.tx
            .send(Envelope {
                user_id: user_id.to_string(),
                notification,
            })
            .map_err(|_| ShopError::Delivery("channel closed".to_string()))
    }
}
