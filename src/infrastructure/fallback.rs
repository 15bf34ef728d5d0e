use crate::domain::account::UserAccount;
use crate::domain::order::{Order, OrderFilter, OrderPatch};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::{LedgerStore, LedgerStoreRef};
use crate::domain::settings::Settings;
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

/// File name of the marker recording that the primary missed writes.
pub const DEGRADED_MARKER: &str = "primary.degraded";

/// Serves from a primary store and mirrors every write to a local one.
///
/// The two stores only answer interchangeably while both hold every write:
///
/// - When a primary write fails but the fallback takes it, the primary is
///   marked degraded. From then on every call goes to the fallback only,
///   since the primary may hold stale records. The state is sticky; with a
///   marker file it also survives restarts until an operator resyncs the
///   stores and removes the marker.
/// - When a mirror write fails, the fallback is marked stale and is no longer
///   used to answer reads the primary cannot serve.
pub struct FallbackLedgerStore {
    primary: LedgerStoreRef,
    fallback: LedgerStoreRef,
    primary_degraded: AtomicBool,
    fallback_stale: AtomicBool,
    marker: Option<PathBuf>,
}

impl FallbackLedgerStore {
    pub fn new(primary: LedgerStoreRef, fallback: LedgerStoreRef) -> Self {
        Self {
            primary,
            fallback,
            primary_degraded: AtomicBool::new(false),
            fallback_stale: AtomicBool::new(false),
            marker: None,
        }
    }

    /// Persists the degraded state at `marker`. An existing marker means the
    /// primary missed writes in an earlier run, so it starts out degraded.
    pub fn with_marker(mut self, marker: impl Into<PathBuf>) -> Self {
        let marker = marker.into();
        if marker.exists() {
            warn!(marker = %marker.display(), "primary store missed writes earlier, serving from fallback only");
            self.primary_degraded.store(true, Ordering::SeqCst);
        }
        self.marker = Some(marker);
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.primary_degraded.load(Ordering::SeqCst)
    }

    fn mark_degraded(&self) {
        if self.primary_degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        error!("primary store missed a write, serving from fallback only until resynced");
        if let Some(marker) = &self.marker
            && let Err(e) = std::fs::write(marker, b"primary store missed writes\n")
        {
            error!(marker = %marker.display(), error = %e, "degraded marker not written");
        }
    }

    async fn read<'a, T, F, Fut>(&'a self, op: &str, call: F) -> Result<T>
    where
        F: Fn(&'a dyn LedgerStore) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        if self.is_degraded() {
            return call(self.fallback.as_ref()).await;
        }
        match call(self.primary.as_ref()).await {
            Ok(value) => Ok(value),
            Err(primary_err) if self.fallback_stale.load(Ordering::SeqCst) => {
                error!(op, error = %primary_err, "primary store failed and fallback is stale");
                Err(primary_err)
            }
            Err(primary_err) => {
                warn!(op, error = %primary_err, "primary store failed, reading from fallback");
                call(self.fallback.as_ref())
                    .await
                    .map_err(|e| both_failed(op, &primary_err, &e))
            }
        }
    }

    async fn write<'a, T, F, Fut>(&'a self, op: &str, call: F) -> Result<T>
    where
        F: Fn(&'a dyn LedgerStore) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        if self.is_degraded() {
            return call(self.fallback.as_ref()).await;
        }
        match call(self.primary.as_ref()).await {
            Ok(value) => {
                if let Err(e) = call(self.fallback.as_ref()).await {
                    warn!(op, error = %e, "fallback store not updated, no longer used for reads");
                    self.fallback_stale.store(true, Ordering::SeqCst);
                }
                Ok(value)
            }
            // A rejected state transition is the answer, not a store failure.
            Err(e @ (ShopError::InvalidStateTransition { .. } | ShopError::OrderNotFound(_))) => {
                Err(e)
            }
            Err(primary_err) if self.fallback_stale.load(Ordering::SeqCst) => {
                error!(op, error = %primary_err, "primary store failed and fallback is stale");
                Err(primary_err)
            }
            Err(primary_err) => match call(self.fallback.as_ref()).await {
                Ok(value) => {
                    warn!(op, error = %primary_err, "primary store failed, write kept in fallback");
                    self.mark_degraded();
                    Ok(value)
                }
                Err(e) => Err(both_failed(op, &primary_err, &e)),
            },
        }
    }
}

fn both_failed(op: &str, primary: &ShopError, fallback: &ShopError) -> ShopError {
    ShopError::Persistence(format!(
        "{} failed on both stores: {}; {}",
        op, primary, fallback
    ))
}

#[async_trait]
impl LedgerStore for FallbackLedgerStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
        self.read("get_user", |s| s.get_user(id)).await
    }

    async fn put_user(&self, account: UserAccount) -> Result<()> {
        self.write("put_user", |s| s.put_user(account.clone())).await
    }

    async fn append_order(&self, order: Order) -> Result<()> {
        self.write("append_order", |s| s.append_order(order.clone()))
            .await
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        self.write("update_order", |s| s.update_order(id, patch.clone()))
            .await
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        self.read("get_order", |s| s.get_order(id)).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.read("list_orders", |s| s.list_orders(filter)).await
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        self.read("get_settings", |s| s.get_settings()).await
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        self.write("put_settings", |s| s.put_settings(settings.clone()))
            .await
    }

    async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
        self.write("put_payment", |s| s.put_payment(payment.clone()))
            .await
    }

    async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
        self.read("list_payments", |s| s.list_payments(user_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::delivery::{DeliveryOption, plan_for};
    use crate::domain::order::OrderStatus;
    use crate::domain::quote::Quote;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::Utc;
    use std::sync::Arc;

    /// An in-memory store that can be taken down and brought back.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn broken() -> Self {
            let store = Self::default();
            store.set_down(true);
            store
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ShopError::Persistence("backend unreachable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
            self.check()?;
            self.inner.get_user(id).await
        }
        async fn put_user(&self, account: UserAccount) -> Result<()> {
            self.check()?;
            self.inner.put_user(account).await
        }
        async fn append_order(&self, order: Order) -> Result<()> {
            self.check()?;
            self.inner.append_order(order).await
        }
        async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
            self.check()?;
            self.inner.update_order(id, patch).await
        }
        async fn get_order(&self, id: &str) -> Result<Option<Order>> {
            self.check()?;
            self.inner.get_order(id).await
        }
        async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
            self.check()?;
            self.inner.list_orders(filter).await
        }
        async fn get_settings(&self) -> Result<Option<Settings>> {
            self.check()?;
            self.inner.get_settings().await
        }
        async fn put_settings(&self, settings: Settings) -> Result<()> {
            self.check()?;
            self.inner.put_settings(settings).await
        }
        async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
            self.check()?;
            self.inner.put_payment(payment).await
        }
        async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
            self.check()?;
            self.inner.list_payments(user_id).await
        }
    }

    fn account(coins: u64) -> UserAccount {
        let mut account = UserAccount::new("1", Utc::now());
        account.coins = coins;
        account
    }

    fn pending_order() -> Order {
        let quote = Quote {
            target_link: "https://t.me/channel/7".to_string(),
            quantity: 300,
            price: 300,
            delivery: plan_for(DeliveryOption::Immediate, 300),
        };
        Order::new("ORD_FLAKY0001".to_string(), "1", quote, Utc::now())
    }

    #[tokio::test]
    async fn test_writes_are_mirrored() {
        let primary = Arc::new(InMemoryLedgerStore::new());
        let local = Arc::new(InMemoryLedgerStore::new());
        let store = FallbackLedgerStore::new(primary.clone(), local.clone());

        let mut account = UserAccount::new("1", Utc::now());
        account.coins = 40;
        store.put_user(account.clone()).await.unwrap();

        assert_eq!(primary.get_user("1").await.unwrap(), Some(account.clone()));
        assert_eq!(local.get_user("1").await.unwrap(), Some(account));
    }

    #[tokio::test]
    async fn test_primary_failure_serves_from_fallback() {
        let local = Arc::new(InMemoryLedgerStore::new());
        let store = FallbackLedgerStore::new(Arc::new(FlakyStore::broken()), local.clone());

        let account = UserAccount::new("1", Utc::now());
        store.put_user(account.clone()).await.unwrap();
        assert_eq!(store.get_user("1").await.unwrap(), Some(account));
    }

    #[tokio::test]
    async fn test_both_failing_is_a_persistence_error() {
        let store = FallbackLedgerStore::new(Arc::new(FlakyStore::broken()), Arc::new(FlakyStore::broken()));
        let result = store.get_settings().await;
        assert!(matches!(result, Err(ShopError::Persistence(msg)) if msg.contains("both stores")));
    }

    #[tokio::test]
    async fn test_missing_order_is_reported_as_not_found() {
        let store = FallbackLedgerStore::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryLedgerStore::new()),
        );
        let result = store
            .update_order("ORD_NONE", OrderPatch::start_processing(Utc::now()))
            .await;
        assert!(matches!(result, Err(ShopError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_debit_written_during_outage_is_not_lost() {
        let primary = Arc::new(FlakyStore::default());
        let store = FallbackLedgerStore::new(primary.clone(), Arc::new(InMemoryLedgerStore::new()));
        store.put_user(account(1000)).await.unwrap();

        primary.set_down(true);
        store.put_user(account(500)).await.unwrap();
        assert!(store.is_degraded());
        primary.set_down(false);

        let balance = store.get_user("1").await.unwrap().map(|a| a.coins);
        assert_eq!(balance, Some(500));
    }

    #[tokio::test]
    async fn test_transition_written_during_outage_is_not_lost() {
        let primary = Arc::new(FlakyStore::default());
        let store = FallbackLedgerStore::new(primary.clone(), Arc::new(InMemoryLedgerStore::new()));
        let order = pending_order();
        store.append_order(order.clone()).await.unwrap();

        primary.set_down(true);
        store
            .update_order(&order.id, OrderPatch::start_processing(Utc::now()))
            .await
            .unwrap();
        primary.set_down(false);

        let stored = store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        // Later writes skip the stale primary, whose copy stays behind.
        store
            .update_order(&order.id, OrderPatch::submitted("991".to_string(), Utc::now()))
            .await
            .unwrap();
        let behind = primary.inner.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(behind.status, OrderStatus::Pending);
        let stored = store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.external_order_id.as_deref(), Some("991"));
    }

    #[tokio::test]
    async fn test_degraded_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(DEGRADED_MARKER);
        let primary = Arc::new(FlakyStore::default());
        let local = Arc::new(InMemoryLedgerStore::new());

        let store = FallbackLedgerStore::new(primary.clone(), local.clone()).with_marker(&marker);
        store.put_user(account(1000)).await.unwrap();
        primary.set_down(true);
        store.put_user(account(500)).await.unwrap();
        assert!(marker.exists());
        primary.set_down(false);

        let reopened = FallbackLedgerStore::new(primary, local).with_marker(&marker);
        assert!(reopened.is_degraded());
        let balance = reopened.get_user("1").await.unwrap().map(|a| a.coins);
        assert_eq!(balance, Some(500));
    }

    #[tokio::test]
    async fn test_stale_fallback_is_not_read() {
        let primary = Arc::new(FlakyStore::default());
        let local = Arc::new(FlakyStore::default());
        let store = FallbackLedgerStore::new(primary.clone(), local.clone());
        store.put_user(account(1000)).await.unwrap();

        local.set_down(true);
        store.put_user(account(500)).await.unwrap();
        local.set_down(false);
        primary.set_down(true);

        assert!(matches!(store.get_user("1").await, Err(ShopError::Persistence(_))));
        assert!(!store.is_degraded());
    }
}
