use super::ledger::Ledger;
use super::scheduler::DispatchScheduler;
use crate::domain::notification::Notification;
use crate::domain::order::{
    ExternalOrderStatus, Order, OrderFilter, OrderPatch, OrderStatus, generate_order_id,
};
use crate::domain::ports::{NotifierRef, OrderApiRef};
use crate::domain::quote::Quote;
use crate::error::{Result, ShopError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The order was no longer pending; nothing was sent.
    Skipped(OrderStatus),
    Submitted { external_order_id: String },
    Failed { error: String },
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub order: Order,
    pub refunded: u64,
    pub balance: u64,
}

/// The order lifecycle state machine.
///
/// `OrderEngine` debits the user when an order is created, dispatches it to the
/// external API (immediately or from a deferred timer), records the outcome
/// and refunds cancelled orders. All status checks and transitions for an
/// order run under its owner's ledger lock, so a cancellation racing a
/// dispatch resolves to exactly one of `cancelled` or `processing`.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct OrderEngine {
    ledger: Arc<Ledger>,
    api: OrderApiRef,
    notifier: NotifierRef,
    scheduler: DispatchScheduler,
}

impl OrderEngine {
    pub fn new(ledger: Arc<Ledger>, api: OrderApiRef, notifier: NotifierRef) -> Self {
        Self {
            ledger,
            api,
            notifier,
            scheduler: DispatchScheduler::new(),
        }
    }

    pub fn scheduler(&self) -> &DispatchScheduler {
        &self.scheduler
    }

    /// Debits the quote's price and records a new `pending` order.
    ///
    /// Immediate orders are dispatched before this returns; delayed orders
    /// get a deferred trigger. Fails with `InsufficientFunds` without touching
    /// the ledger if the balance does not cover the price.
    pub async fn create_order(&self, user_id: &str, quote: Quote) -> Result<Order> {
        let order = {
            let _guard = self.ledger.lock_user(user_id).await;
            let mut account = self.ledger.account(user_id).await?;
            account.debit(quote.price)?;

            let now = Utc::now();
            let order = Order::new(generate_order_id(now), user_id, quote, now);
            self.ledger.save_account(account.clone()).await?;
            if let Err(e) = self.ledger.append_order(order.clone()).await {
                account.credit(order.price);
                if let Err(rollback) = self.ledger.save_account(account).await {
                    error!(
                        user_id,
                        order_id = %order.id,
                        price = order.price,
                        error = %rollback,
                        "debit rollback failed after order was not stored"
                    );
                }
                return Err(e);
            }
            order
        };

        info!(
            user_id,
            order_id = %order.id,
            quantity = order.quantity,
            price = order.price,
            delivery = %order.delivery.option,
            "order created"
        );
        self.notify(
            user_id,
            Notification::OrderReceived {
                order_id: order.id.clone(),
                quantity: order.quantity,
                delivery: order.delivery.description(),
            },
        )
        .await;

        let delay = order.delivery.start_delay();
        if delay.is_zero() {
            if let Err(e) = self.dispatch(&order.id).await {
                error!(order_id = %order.id, error = %e, "immediate dispatch failed");
            }
            return self.ledger.order(&order.id).await;
        }

        self.schedule(&order.id, delay);
        self.notify(
            user_id,
            Notification::OrderScheduled {
                order_id: order.id.clone(),
                start_delay_minutes: order.delivery.start_delay_minutes,
            },
        )
        .await;
        Ok(order)
    }

    /// Moves a `pending` order to `processing` and submits it.
    ///
    /// A no-op for orders that are no longer pending, so duplicate or racing
    /// triggers never submit twice.
    pub async fn dispatch(&self, order_id: &str) -> Result<DispatchOutcome> {
        let user_id = self.ledger.order(order_id).await?.user_id;

        let order = {
            let _guard = self.ledger.lock_user(&user_id).await;
            let current = self.ledger.order(order_id).await?;
            if current.status != OrderStatus::Pending {
                info!(order_id, status = %current.status, "order no longer pending, skipping dispatch");
                return Ok(DispatchOutcome::Skipped(current.status));
            }
            self.ledger
                .update_order(order_id, OrderPatch::start_processing(Utc::now()))
                .await?
        };
        self.scheduler.disarm(order_id);

        info!(order_id, "submitting order to external API");
        let outcome = match self.api.submit(&order).await {
            Ok(external_order_id) => {
                let _guard = self.ledger.lock_user(&user_id).await;
                self.ledger
                    .update_order(
                        order_id,
                        OrderPatch::submitted(external_order_id.clone(), Utc::now()),
                    )
                    .await
                    .map_err(|e| {
                        error!(
                            order_id,
                            external_order_id = %external_order_id,
                            error = %e,
                            "order accepted by external API but not recorded"
                        );
                        ShopError::Persistence(format!(
                            "order {} accepted as provider order {} but not recorded: {}",
                            order_id, external_order_id, e
                        ))
                    })?;
                info!(order_id, external_order_id = %external_order_id, "order accepted by external API");
                DispatchOutcome::Submitted { external_order_id }
            }
            Err(e) => {
                let error = match e {
                    ShopError::ExternalApi(message) => message,
                    other => other.to_string(),
                };
                let _guard = self.ledger.lock_user(&user_id).await;
                self.ledger
                    .update_order(order_id, OrderPatch::failed(error.clone(), Utc::now()))
                    .await
                    .inspect_err(|e| {
                        error!(order_id, api_error = %error, error = %e, "order failure not recorded")
                    })?;
                error!(order_id, error = %error, "order failed");
                DispatchOutcome::Failed { error }
            }
        };

        let notification = match &outcome {
            DispatchOutcome::Submitted { external_order_id } => Notification::OrderSubmitted {
                order_id: order_id.to_string(),
                external_order_id: external_order_id.clone(),
            },
            DispatchOutcome::Failed { error } => Notification::OrderFailed {
                order_id: order_id.to_string(),
                error: error.clone(),
            },
            DispatchOutcome::Skipped(_) => return Ok(outcome),
        };
        self.notify(&user_id, notification).await;
        Ok(outcome)
    }

    /// Cancels a `pending` order owned by `user_id` and refunds its price.
    ///
    /// Any armed deferred dispatch is revoked. Orders in any other state are
    /// rejected with `InvalidStateTransition` and left untouched.
    pub async fn cancel_order(&self, user_id: &str, order_id: &str) -> Result<Cancellation> {
        let order = self.ledger.order(order_id).await?;
        if order.user_id != user_id {
            warn!(user_id, order_id, owner = %order.user_id, "cancel attempt on foreign order");
            return Err(ShopError::Forbidden(
                "You can only cancel your own orders".to_string(),
            ));
        }

        let (order, balance) = {
            let _guard = self.ledger.lock_user(user_id).await;
            let current = self.ledger.order(order_id).await?;
            if current.status != OrderStatus::Pending {
                return Err(ShopError::InvalidStateTransition {
                    order_id: order_id.to_string(),
                    status: current.status,
                });
            }
            // Refund first, so a cancelled order is always a refunded one.
            let mut account = self.ledger.account(user_id).await?;
            account.credit(current.price);
            self.ledger.save_account(account.clone()).await?;

            let cancelled = match self
                .ledger
                .update_order(order_id, OrderPatch::cancelled(user_id, Utc::now()))
                .await
            {
                Ok(cancelled) => cancelled,
                Err(e) => {
                    self.revert_refund(user_id, order_id, current.price).await;
                    return Err(e);
                }
            };
            if self.scheduler.disarm(order_id) {
                info!(order_id, "deferred dispatch revoked");
            }
            (cancelled, account.coins)
        };

        info!(user_id, order_id, refunded = order.price, "order cancelled");
        self.notify(
            user_id,
            Notification::OrderCancelled {
                order_id: order_id.to_string(),
                refunded: order.price,
            },
        )
        .await;
        Ok(Cancellation {
            refunded: order.price,
            order,
            balance,
        })
    }

    /// Re-arms deferred dispatch for orders still pending after a restart.
    ///
    /// The remaining delay is measured from `created_at`; overdue orders are
    /// dispatched right away (still on the scheduler).
    pub async fn resume_pending(&self) -> Result<usize> {
        let pending = self
            .ledger
            .orders(&OrderFilter::default().with_status(OrderStatus::Pending))
            .await?;
        let now = Utc::now();
        for order in &pending {
            let due = order.created_at
                + chrono::Duration::minutes(i64::from(order.delivery.start_delay_minutes));
            let remaining = (due - now).to_std().unwrap_or(Duration::ZERO);
            info!(order_id = %order.id, remaining_secs = remaining.as_secs(), "resuming pending order");
            self.schedule(&order.id, remaining);
        }
        Ok(pending.len())
    }

    pub async fn order_for(&self, user_id: &str, order_id: &str) -> Result<Order> {
        let order = self.ledger.order(order_id).await?;
        if order.user_id != user_id {
            return Err(ShopError::Forbidden(
                "You can only view your own orders".to_string(),
            ));
        }
        Ok(order)
    }

    pub async fn orders_for(&self, user_id: &str) -> Result<Vec<Order>> {
        self.ledger.orders(&OrderFilter::for_user(user_id)).await
    }

    /// The user's orders that can still be cancelled.
    pub async fn pending_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        self.ledger
            .orders(&OrderFilter::for_user(user_id).with_status(OrderStatus::Pending))
            .await
    }

    /// Asks the external API about a submitted order. Local state is not changed.
    pub async fn external_status(
        &self,
        user_id: &str,
        order_id: &str,
    ) -> Result<ExternalOrderStatus> {
        let order = self.order_for(user_id, order_id).await?;
        let external_id = order.external_order_id.ok_or_else(|| {
            ShopError::Validation(format!(
                "Order {} has not been accepted by the provider yet (status: {})",
                order.id, order.status
            ))
        })?;
        self.api.check_status(&external_id).await
    }

    /// Takes back a refund whose cancellation could not be recorded.
    /// Callers hold the user's lock.
    async fn revert_refund(&self, user_id: &str, order_id: &str, price: u64) {
        let reverted = match self.ledger.account(user_id).await {
            Ok(mut account) => account.debit(price).map(|_| account),
            Err(e) => Err(e),
        };
        let result = match reverted {
            Ok(account) => self.ledger.save_account(account).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(user_id, order_id, price, error = %e, "refund rollback failed after order was not cancelled");
        }
    }

    fn schedule(&self, order_id: &str, delay: Duration) {
        let engine = self.clone();
        let id = order_id.to_string();
        self.scheduler.arm(order_id, delay, async move {
            if let Err(e) = engine.dispatch(&id).await {
                error!(order_id = %id, error = %e, "deferred dispatch failed");
            }
        });
    }

    async fn notify(&self, user_id: &str, notification: Notification) {
        if let Err(e) = self.notifier.notify(user_id, notification).await {
            warn!(user_id, error = %e, "notification not delivered");
        }
    }
}
