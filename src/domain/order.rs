use super::delivery::{DeliveryOption, DeliveryPlan};
use super::quote::Quote;
use super::record::{as_text, as_timestamp, as_u64};
use crate::error::{Result, ShopError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const ORDER_ID_PREFIX: &str = "ORD_";
const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Allowed edges of the lifecycle state machine.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A purchase of views for one post.
///
/// Created in `Pending` with the price already debited. Only the order engine
/// mutates orders, always through [`Order::apply`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub target_link: String,
    pub quantity: u64,
    pub price: u64,
    pub delivery: DeliveryPlan,
    pub status: OrderStatus,
    pub external_order_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

impl Order {
    pub fn new(id: String, user_id: impl Into<String>, quote: Quote, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            target_link: quote.target_link,
            quantity: quote.quantity,
            price: quote.price,
            delivery: quote.delivery,
            status: OrderStatus::Pending,
            external_order_id: None,
            error: None,
            created_at: now,
            processing_started_at: None,
            last_attempt_at: None,
            cancelled_at: None,
            cancelled_by: None,
        }
    }

    /// Applies a patch, enforcing the status state machine.
    ///
    /// Terminal orders are immutable; any patch to them is rejected.
    pub fn apply(&mut self, patch: OrderPatch) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ShopError::InvalidStateTransition {
                order_id: self.id.clone(),
                status: self.status,
            });
        }
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(ShopError::InvalidStateTransition {
                    order_id: self.id.clone(),
                    status: self.status,
                });
            }
            self.status = next;
        }
        if let Some(external_order_id) = patch.external_order_id {
            self.external_order_id = external_order_id;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(at) = patch.processing_started_at {
            self.processing_started_at = Some(at);
        }
        if let Some(at) = patch.last_attempt_at {
            self.last_attempt_at = Some(at);
        }
        if let Some(at) = patch.cancelled_at {
            self.cancelled_at = Some(at);
        }
        if let Some(by) = patch.cancelled_by {
            self.cancelled_by = Some(by);
        }
        Ok(())
    }
}

/// Partial update of an order. `None` leaves a field untouched; the nested
/// options on `external_order_id`/`error` allow clearing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub external_order_id: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
}

impl OrderPatch {
    pub fn start_processing(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Processing),
            processing_started_at: Some(now),
            last_attempt_at: Some(now),
            ..Self::default()
        }
    }

    pub fn submitted(external_order_id: String, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Processing),
            external_order_id: Some(Some(external_order_id)),
            error: Some(None),
            last_attempt_at: Some(now),
            ..Self::default()
        }
    }

    pub fn failed(error: String, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Failed),
            error: Some(Some(error)),
            last_attempt_at: Some(now),
            ..Self::default()
        }
    }

    pub fn cancelled(by: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Cancelled),
            cancelled_at: Some(now),
            cancelled_by: Some(by.into()),
            ..Self::default()
        }
    }
}

/// Selection criteria for `list_orders`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub user_id: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == order.user_id)
            && self.status.is_none_or(|s| s == order.status)
    }
}

/// Status report returned by the external API for a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalOrderStatus {
    pub status: String,
    pub charge: Option<String>,
    pub start_count: Option<String>,
    pub remains: Option<String>,
}

/// Generates a collision-resistant order id: prefix, random suffix, timestamp.
pub fn generate_order_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("{}{}{}", ORDER_ID_PREFIX, suffix, now.timestamp_millis())
}

/// Normalizes a stored order record into the canonical [`Order`] shape.
///
/// Records already in canonical form pass through untouched; older records
/// (`views`, `post_link`, `api_runs`, string timestamps, ...) are mapped field
/// by field. Returns the order and whether it was rewritten.
pub fn normalize_record(record: Value, now: DateTime<Utc>) -> Result<(Order, bool)> {
    if let Ok(order) = serde_json::from_value::<Order>(record.clone()) {
        return Ok((order, false));
    }

    let obj = record
        .as_object()
        .ok_or_else(|| ShopError::Persistence("order record is not an object".to_string()))?;
    let field = |names: &[&str]| names.iter().find_map(|n| obj.get(*n).filter(|v| !v.is_null()));

    let id = field(&["id"])
        .and_then(as_text)
        .filter(|id| id.starts_with(ORDER_ID_PREFIX))
        .unwrap_or_else(|| generate_order_id(now));
    let quantity = field(&["quantity", "views"]).and_then(as_u64).unwrap_or(0);
    let start_delay_minutes = field(&["start_delay"])
        .and_then(as_u64)
        .and_then(|d| u32::try_from(d).ok())
        .unwrap_or(0);
    let runs = field(&["api_runs", "runs"]).and_then(as_u64);
    let interval_minutes = field(&["api_interval", "interval"])
        .and_then(as_u64)
        .and_then(|i| u32::try_from(i).ok());
    let option = field(&["delivery", "delivery_method"])
        .and_then(as_text)
        .and_then(|token| token.parse::<DeliveryOption>().ok())
        .unwrap_or(DeliveryOption::Immediate);
    let batch_size = match option {
        DeliveryOption::Drip { batch_size, .. } => Some(batch_size),
        DeliveryOption::Slow => runs.filter(|r| *r > 0).map(|r| quantity / r),
        DeliveryOption::Immediate => None,
    };
    let (status, legacy_error) = match field(&["status"]).and_then(as_text) {
        None => (OrderStatus::Pending, None),
        Some(raw) => match serde_json::from_value::<OrderStatus>(Value::String(raw.to_lowercase())) {
            Ok(status) => (status, None),
            Err(_) => (
                OrderStatus::Failed,
                Some(format!("unrecognized legacy status: {}", raw)),
            ),
        },
    };

    let order = Order {
        id,
        user_id: field(&["user_id"]).and_then(as_text).unwrap_or_default(),
        target_link: field(&["target_link", "post_link"])
            .and_then(as_text)
            .unwrap_or_default(),
        quantity,
        price: field(&["price"]).and_then(as_u64).unwrap_or(0),
        delivery: DeliveryPlan {
            option,
            batch_size,
            runs,
            interval_minutes,
            start_delay_minutes,
        },
        status,
        external_order_id: field(&["external_order_id", "api_order_id"]).and_then(as_text),
        error: field(&["error"]).and_then(as_text).or(legacy_error),
        created_at: field(&["created_at", "order_date"])
            .and_then(as_timestamp)
            .unwrap_or(now),
        processing_started_at: field(&["processing_started_at", "processing_started"])
            .and_then(as_timestamp),
        last_attempt_at: field(&["last_attempt_at", "last_attempt"]).and_then(as_timestamp),
        cancelled_at: field(&["cancelled_at"]).and_then(as_timestamp),
        cancelled_by: field(&["cancelled_by"]).and_then(as_text),
    };
    Ok((order, true))
}
