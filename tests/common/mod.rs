#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use viewshop::application::engine::OrderEngine;
use viewshop::application::ledger::Ledger;
use viewshop::domain::account::UserAccount;
use viewshop::domain::delivery::plan_for_token;
use viewshop::domain::notification::Notification;
use viewshop::domain::order::{ExternalOrderStatus, Order, OrderFilter, OrderPatch};
use viewshop::domain::payment::PaymentRequest;
use viewshop::domain::ports::{LedgerStore, Notifier, OrderApi};
use viewshop::domain::pricing::PricingPolicy;
use viewshop::domain::quote::Quote;
use viewshop::domain::settings::Settings;
use viewshop::error::{Result, ShopError};
use viewshop::infrastructure::in_memory::InMemoryLedgerStore;

pub const LINK: &str = "https://t.me/channel/100";

/// Order API double answering from a script of results.
///
/// Once the script runs out every submission succeeds with a fresh id.
/// A gated API blocks each submission until [`ScriptedOrderApi::release`].
#[derive(Default)]
pub struct ScriptedOrderApi {
    responses: Mutex<VecDeque<Result<String>>>,
    submitted: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
    entered: Notify,
}

impl ScriptedOrderApi {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Order ids passed to `submit`, in call order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    /// Waits until a submission is in flight.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl OrderApi for ScriptedOrderApi {
    async fn submit(&self, order: &Order) -> Result<String> {
        self.submitted.lock().unwrap().push(order.id.clone());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("EXT-{}", self.submitted.lock().unwrap().len())))
    }

    async fn check_status(&self, external_id: &str) -> Result<ExternalOrderStatus> {
        Ok(ExternalOrderStatus {
            status: "In progress".to_string(),
            remains: Some(external_id.to_string()),
            ..ExternalOrderStatus::default()
        })
    }
}

/// Notifier double that keeps everything it is sent.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds_for(&self, order_id: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .map(|(_, n)| n)
            .filter(|n| n.order_id() == Some(order_id))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: &str, notification: Notification) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), notification));
        Ok(())
    }
}

/// Ledger store over an in-memory one whose account and order writes can be
/// made to fail, one kind at a time.
pub struct FaultyStore {
    inner: Arc<InMemoryLedgerStore>,
    fail_put_user: AtomicBool,
    /// Number of order updates still allowed before they start failing.
    updates_left: Mutex<Option<usize>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryLedgerStore>) -> Self {
        Self {
            inner,
            fail_put_user: AtomicBool::new(false),
            updates_left: Mutex::new(None),
        }
    }

    pub fn fail_put_user(&self, fail: bool) {
        self.fail_put_user.store(fail, Ordering::SeqCst);
    }

    /// Lets `allowed` more order updates through, then fails the rest.
    pub fn fail_updates_after(&self, allowed: usize) {
        *self.updates_left.lock().unwrap() = Some(allowed);
    }

    pub fn heal(&self) {
        self.fail_put_user(false);
        *self.updates_left.lock().unwrap() = None;
    }

    fn down() -> ShopError {
        ShopError::Persistence("disk unavailable".to_string())
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
        self.inner.get_user(id).await
    }

    async fn put_user(&self, account: UserAccount) -> Result<()> {
        if self.fail_put_user.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.put_user(account).await
    }

    async fn append_order(&self, order: Order) -> Result<()> {
        self.inner.append_order(order).await
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        {
            let mut left = self.updates_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => return Err(Self::down()),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.update_order(id, patch).await
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        self.inner.get_order(id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.inner.list_orders(filter).await
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        self.inner.get_settings().await
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        self.inner.put_settings(settings).await
    }

    async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
        self.inner.put_payment(payment).await
    }

    async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
        self.inner.list_payments(user_id).await
    }
}

pub struct Harness {
    pub engine: OrderEngine,
    pub store: Arc<InMemoryLedgerStore>,
    pub api: Arc<ScriptedOrderApi>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(api: ScriptedOrderApi) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        Self::build(api, store.clone(), store)
    }

    /// A harness whose engine writes through a [`FaultyStore`].
    pub fn with_faults(api: ScriptedOrderApi) -> (Self, Arc<FaultyStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let faulty = Arc::new(FaultyStore::new(store.clone()));
        (Self::build(api, store, faulty.clone()), faulty)
    }

    fn build(
        api: ScriptedOrderApi,
        store: Arc<InMemoryLedgerStore>,
        engine_store: Arc<dyn LedgerStore>,
    ) -> Self {
        let api = Arc::new(api);
        let notifier = Arc::new(RecordingNotifier::default());
        let ledger = Arc::new(Ledger::new(engine_store));
        let engine = OrderEngine::new(ledger, api.clone(), notifier.clone());
        Self {
            engine,
            store,
            api,
            notifier,
        }
    }

    pub async fn fund(&self, user_id: &str, coins: u64) {
        let mut account = UserAccount::new(user_id, Utc::now());
        account.coins = coins;
        self.store.put_user(account).await.unwrap();
    }

    pub async fn balance(&self, user_id: &str) -> u64 {
        self.store
            .get_user(user_id)
            .await
            .unwrap()
            .map(|a| a.coins)
            .unwrap_or_default()
    }

    pub async fn order(&self, order_id: &str) -> Order {
        self.store.get_order(order_id).await.unwrap().unwrap()
    }

    pub async fn order_count(&self) -> usize {
        self.store
            .list_orders(&Default::default())
            .await
            .unwrap()
            .len()
    }
}

/// A priced quote for `quantity` views with the given delivery token.
pub fn quote(quantity: u64, delivery: &str) -> Quote {
    Quote {
        target_link: LINK.to_string(),
        quantity,
        price: PricingPolicy::default().price_for(quantity).unwrap(),
        delivery: plan_for_token(delivery, quantity).unwrap(),
    }
}

pub fn api_error(message: &str) -> Result<String> {
    Err(ShopError::ExternalApi(message.to_string()))
}
