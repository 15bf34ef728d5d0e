use serde::Serialize;

/// State changes pushed to a user outside of a direct reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OrderReceived {
        order_id: String,
        quantity: u64,
        delivery: String,
    },
    OrderScheduled {
        order_id: String,
        start_delay_minutes: u32,
    },
    OrderSubmitted {
        order_id: String,
        external_order_id: String,
    },
    OrderFailed {
        order_id: String,
        error: String,
    },
    OrderCancelled {
        order_id: String,
        refunded: u64,
    },
    CoinsGranted {
        amount: u64,
        balance: u64,
    },
}

impl Notification {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderReceived { order_id, .. }
            | Self::OrderScheduled { order_id, .. }
            | Self::OrderSubmitted { order_id, .. }
            | Self::OrderFailed { order_id, .. }
            | Self::OrderCancelled { order_id, .. } => Some(order_id),
            Self::CoinsGranted { .. } => None,
        }
    }
}
