use super::locks::KeyedLocks;
use crate::domain::account::UserAccount;
use crate::domain::order::{Order, OrderFilter, OrderPatch};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::settings::Settings;
use crate::error::{Result, ShopError};
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::info;

/// Repository owning every read and write to the ledger store.
///
/// Balance and order mutations for one user happen under that user's lock,
/// obtained with [`Ledger::lock_user`]. Debits, refunds and grants all share
/// it, so no update is lost.
pub struct Ledger {
    store: LedgerStoreRef,
    user_locks: KeyedLocks,
    settings_lock: tokio::sync::Mutex<()>,
}

impl Ledger {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self {
            store,
            user_locks: KeyedLocks::new(),
            settings_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.user_locks.lock(user_id).await
    }

    /// Loads an account, creating and persisting it with zero coins on first
    /// reference. Callers must hold the user's lock.
    pub async fn account(&self, user_id: &str) -> Result<UserAccount> {
        if let Some(account) = self.store.get_user(user_id).await? {
            return Ok(account);
        }
        let account = UserAccount::new(user_id, Utc::now());
        self.store.put_user(account.clone()).await?;
        info!(user_id, "account created");
        Ok(account)
    }

    pub async fn save_account(&self, account: UserAccount) -> Result<()> {
        self.store.put_user(account).await
    }

    pub async fn order(&self, order_id: &str) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ShopError::OrderNotFound(order_id.to_string()))
    }

    pub async fn append_order(&self, order: Order) -> Result<()> {
        self.store.append_order(order).await
    }

    pub async fn update_order(&self, order_id: &str, patch: OrderPatch) -> Result<Order> {
        self.store.update_order(order_id, patch).await
    }

    pub async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut orders = self.store.list_orders(filter).await?;
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    pub async fn settings(&self) -> Result<Settings> {
        Ok(self.store.get_settings().await?.unwrap_or_default())
    }

    /// Read-modify-write of the settings singleton.
    pub async fn update_settings<F>(&self, update: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let _guard = self.settings_lock.lock().await;
        let mut settings = self.settings().await?;
        update(&mut settings)?;
        self.store.put_settings(settings.clone()).await?;
        Ok(settings)
    }

    pub async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
        self.store.put_payment(payment).await
    }

    pub async fn payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
        self.store.list_payments(user_id).await
    }
}
