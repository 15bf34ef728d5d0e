use crate::domain::account::UserAccount;
use crate::domain::order::{Order, OrderFilter, OrderPatch};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::LedgerStore;
use crate::domain::settings::Settings;
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for user accounts, keyed by user id.
pub const CF_USERS: &str = "users";
/// Column Family for orders, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for coin purchase requests, keyed by reference.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family holding the single settings record.
pub const CF_SETTINGS: &str = "settings";

const SETTINGS_KEY: &[u8] = b"settings";

/// A persistent ledger store backed by RocksDB.
///
/// Each entity kind lives in its own Column Family with JSON values.
/// Read-modify-write on orders is serialized by `write_lock`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbLedgerStore {
    /// Opens or creates a RocksDB instance at the specified path,
    /// creating any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_USERS, CF_ORDERS, CF_PAYMENTS, CF_SETTINGS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ShopError::Persistence(format!("column family {} not found", name)))
    }

    fn put<T: Serialize>(&self, family: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(&cf, key, bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_pinned_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, family: &str) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
        self.get(CF_USERS, id.as_bytes())
    }

    async fn put_user(&self, account: UserAccount) -> Result<()> {
        self.put(CF_USERS, account.id.as_bytes(), &account)
    }

    async fn append_order(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_ORDERS)?;
        if self.db.get_pinned_cf(&cf, order.id.as_bytes())?.is_some() {
            return Err(ShopError::Persistence(format!(
                "order {} already exists",
                order.id
            )));
        }
        self.put(CF_ORDERS, order.id.as_bytes(), &order)
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let mut order: Order = self
            .get(CF_ORDERS, id.as_bytes())?
            .ok_or_else(|| ShopError::OrderNotFound(id.to_string()))?;
        order.apply(patch)?;
        self.put(CF_ORDERS, id.as_bytes(), &order)?;
        Ok(order)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        self.get(CF_ORDERS, id.as_bytes())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let orders: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(orders.into_iter().filter(|o| filter.matches(o)).collect())
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        self.get(CF_SETTINGS, SETTINGS_KEY)
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        self.put(CF_SETTINGS, SETTINGS_KEY, &settings)
    }

    async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
        self.put(CF_PAYMENTS, payment.reference.as_bytes(), &payment)
    }

    async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
        let payments: Vec<PaymentRequest> = self.scan(CF_PAYMENTS)?;
        Ok(payments
            .into_iter()
            .filter(|p| user_id.is_none_or(|u| p.user_id == u))
            .collect())
    }
}
