use crate::domain::account::UserAccount;
use crate::domain::order::{Order, OrderFilter, OrderPatch};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::LedgerStore;
use crate::domain::settings::Settings;
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserAccount>,
    orders: Vec<Order>,
    payments: Vec<PaymentRequest>,
    settings: Option<Settings>,
}

/// A thread-safe in-memory ledger store.
///
/// Uses `Arc<RwLock<..>>` so clones share the same tables.
/// Ideal for testing or short-lived runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(id).cloned())
    }

    async fn put_user(&self, account: UserAccount) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.users.insert(account.id.clone(), account);
        Ok(())
    }

    async fn append_order(&self, order: Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.iter().any(|o| o.id == order.id) {
            return Err(ShopError::Persistence(format!(
                "order {} already exists",
                order.id
            )));
        }
        tables.orders.push(order);
        Ok(())
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ShopError::OrderNotFound(id.to_string()))?;
        let mut updated = order.clone();
        updated.apply(patch)?;
        *order = updated.clone();
        Ok(updated)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        let tables = self.tables.read().await;
        Ok(tables.settings.clone())
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.settings = Some(settings);
        Ok(())
    }

    async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables
            .payments
            .iter_mut()
            .find(|p| p.reference == payment.reference)
        {
            Some(existing) => *existing = payment,
            None => tables.payments.push(payment),
        }
        Ok(())
    }

    async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .filter(|p| user_id.is_none_or(|u| p.user_id == u))
            .cloned()
            .collect())
    }
}
