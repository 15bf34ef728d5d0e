//! Text the storefront sends back to users.

use crate::application::accounts::PurchaseRequest;
use crate::application::engine::Cancellation;
use crate::domain::delivery::PRESET_DRIP_OPTIONS;
use crate::domain::notification::Notification;
use crate::domain::order::{ExternalOrderStatus, Order};
use crate::domain::payment::PaymentRequest;
use crate::error::ShopError;

pub fn error(e: &ShopError) -> String {
    match e {
        ShopError::Validation(msg) | ShopError::Forbidden(msg) => msg.clone(),
        ShopError::InsufficientFunds {
            required,
            available,
        } => format!(
            "Insufficient balance: this order costs {} coins but you have {}. You need {} more coins; use buy to top up.",
            required,
            available,
            e.shortfall().unwrap_or_default()
        ),
        ShopError::InvalidStateTransition { order_id, status } => format!(
            "Cannot do that now: order {} is {}. Only pending orders can be cancelled.",
            order_id, status
        ),
        ShopError::ExternalApi(msg) => msg.clone(),
        ShopError::OrderNotFound(id) => format!("Order {} not found", id),
        ShopError::NoActiveQuote => {
            "No order in progress. Send a post link with view to start.".to_string()
        }
        ShopError::Persistence(_) | ShopError::Config(_) | ShopError::Delivery(_) => {
            "Something went wrong on our side. Please try again later.".to_string()
        }
    }
}

pub fn notification(n: &Notification) -> String {
    match n {
        Notification::OrderReceived {
            order_id,
            quantity,
            delivery,
        } => format!(
            "Order {} received: {} views, delivery: {}",
            order_id, quantity, delivery
        ),
        Notification::OrderScheduled {
            order_id,
            start_delay_minutes,
        } => format!(
            "Order {} will start in {} min",
            order_id, start_delay_minutes
        ),
        Notification::OrderSubmitted {
            order_id,
            external_order_id,
        } => format!(
            "Order {} is being processed (provider order {})",
            order_id, external_order_id
        ),
        Notification::OrderFailed { order_id, error } => {
            format!("Order {} failed: {}", order_id, error)
        }
        Notification::OrderCancelled { order_id, refunded } => format!(
            "Order {} cancelled, {} coins refunded",
            order_id, refunded
        ),
        Notification::CoinsGranted { amount, balance } => format!(
            "{} coins added to your account. New balance: {} coins",
            amount, balance
        ),
    }
}

pub fn order_line(order: &Order) -> String {
    let mut line = format!(
        "{} | {} views | {} coins | {} | {}",
        order.id,
        order.quantity,
        order.price,
        order.delivery.description(),
        order.status
    );
    if let Some(external) = &order.external_order_id {
        line.push_str(&format!(" | provider #{}", external));
    }
    if let Some(error) = &order.error {
        line.push_str(&format!(" | {}", error));
    }
    line
}

pub fn order_list(orders: &[Order], empty: &str) -> String {
    if orders.is_empty() {
        return empty.to_string();
    }
    orders
        .iter()
        .map(order_line)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn order_placed(order: &Order, balance: u64) -> String {
    format!(
        "Order {} placed: {} views for {} coins ({}). Status: {}. Balance: {} coins",
        order.id,
        order.quantity,
        order.price,
        order.delivery.description(),
        order.status,
        balance
    )
}

pub fn price_quote(quantity_input: &str, price: u64) -> String {
    format!(
        "{} views cost {} coins. Choose a speed: immediate, slow, {}",
        quantity_input.trim(),
        price,
        PRESET_DRIP_OPTIONS.join(", ")
    )
}

pub fn cancellation(c: &Cancellation) -> String {
    format!(
        "Order {} cancelled. {} coins refunded. Balance: {} coins",
        c.order.id, c.refunded, c.balance
    )
}

pub fn external_status(order_id: &str, status: &ExternalOrderStatus) -> String {
    let mut line = format!("Order {}: {}", order_id, status.status);
    if let Some(start_count) = &status.start_count {
        line.push_str(&format!(", start count {}", start_count));
    }
    if let Some(remains) = &status.remains {
        line.push_str(&format!(", remaining {}", remains));
    }
    line
}

pub fn purchase(request: &PurchaseRequest) -> String {
    format!(
        "Purchase request {}: {} coins for ${}. Send payment to @{} quoting the reference.",
        request.payment.reference,
        request.payment.coins,
        request.payment.price,
        request.payment_contact
    )
}

pub fn payment_list(payments: &[PaymentRequest]) -> String {
    if payments.is_empty() {
        return "No pending payments".to_string();
    }
    payments
        .iter()
        .map(|p| format!("{} | user {} | {} coins | ${}", p.reference, p.user_id, p.coins, p.price))
        .collect::<Vec<_>>()
        .join("; ")
}
