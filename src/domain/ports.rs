use super::account::UserAccount;
use super::notification::Notification;
use super::order::{ExternalOrderStatus, Order, OrderFilter, OrderPatch};
use super::payment::PaymentRequest;
use super::settings::Settings;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable storage for accounts, orders, payments and settings.
///
/// Every write must be durable before it returns `Ok`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<UserAccount>>;
    async fn put_user(&self, account: UserAccount) -> Result<()>;
    /// Fails if an order with the same id exists.
    async fn append_order(&self, order: Order) -> Result<()>;
    /// Applies `patch` through [`Order::apply`] and returns the updated order.
    async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order>;
    async fn get_order(&self, id: &str) -> Result<Option<Order>>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;
    async fn get_settings(&self) -> Result<Option<Settings>>;
    async fn put_settings(&self, settings: Settings) -> Result<()>;
    /// Inserts or replaces a payment request by reference.
    async fn put_payment(&self, payment: PaymentRequest) -> Result<()>;
    async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>>;
}

/// Third-party service that fulfils view orders.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Submits the order and returns the external order id.
    async fn submit(&self, order: &Order) -> Result<String>;
    async fn check_status(&self, external_id: &str) -> Result<ExternalOrderStatus>;
}

/// Outbound channel to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, notification: Notification) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type OrderApiRef = Arc<dyn OrderApi>;
pub type NotifierRef = Arc<dyn Notifier>;
