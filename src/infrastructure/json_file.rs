use crate::domain::account::{UserAccount, normalize_account_record};
use crate::domain::order::{Order, OrderFilter, OrderPatch, normalize_record};
use crate::domain::payment::PaymentRequest;
use crate::domain::ports::LedgerStore;
use crate::domain::settings::Settings;
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::info;

pub const USERS_FILE: &str = "users.json";
pub const ORDERS_FILE: &str = "orders.json";
pub const PAYMENTS_FILE: &str = "payments.json";
pub const SETTINGS_FILE: &str = "settings.json";

struct Tables {
    users: BTreeMap<String, UserAccount>,
    orders: Vec<Order>,
    payments: Vec<PaymentRequest>,
    settings: Option<Settings>,
}

/// Ledger store kept in JSON files under one directory.
///
/// Tables are cached in memory and each write rewrites the affected file
/// through a temp file + rename, so a crash never leaves a half-written table.
/// Legacy order and account records are normalized when the store is opened.
#[derive(Clone)]
pub struct JsonFileLedgerStore {
    dir: PathBuf,
    tables: Arc<Mutex<Tables>>,
}

impl JsonFileLedgerStore {
    /// Opens (or creates) the store in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let now = Utc::now();

        let raw_users: BTreeMap<String, Value> = read_json(&dir, USERS_FILE)?.unwrap_or_default();
        let users = raw_users
            .iter()
            .map(|(id, record)| (id.clone(), normalize_account_record(id, record, now)))
            .collect();

        let raw_orders: Vec<Value> = read_json(&dir, ORDERS_FILE)?.unwrap_or_default();
        let mut orders = Vec::with_capacity(raw_orders.len());
        let mut rewritten = 0;
        for record in raw_orders {
            let (order, changed) = normalize_record(record, now)?;
            rewritten += usize::from(changed);
            orders.push(order);
        }

        let tables = Tables {
            users,
            orders,
            payments: read_json(&dir, PAYMENTS_FILE)?.unwrap_or_default(),
            settings: read_json(&dir, SETTINGS_FILE)?,
        };
        if rewritten > 0 {
            write_json(&dir, ORDERS_FILE, &tables.orders)?;
            info!(count = rewritten, "normalized legacy order records");
        }
        write_json(&dir, USERS_FILE, &tables.users)?;

        Ok(Self {
            dir,
            tables: Arc::new(Mutex::new(tables)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<T>> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ShopError::Persistence(format!("{}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)
        .map_err(|e| ShopError::Persistence(format!("cannot encode {}: {}", name, e)))?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name))
        .map_err(|e| ShopError::Persistence(format!("cannot write {}: {}", name, e)))?;
    Ok(())
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(id).cloned())
    }

    async fn put_user(&self, account: UserAccount) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut users = tables.users.clone();
        users.insert(account.id.clone(), account);
        write_json(&self.dir, USERS_FILE, &users)?;
        tables.users = users;
        Ok(())
    }

    async fn append_order(&self, order: Order) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.orders.iter().any(|o| o.id == order.id) {
            return Err(ShopError::Persistence(format!(
                "order {} already exists",
                order.id
            )));
        }
        let mut orders = tables.orders.clone();
        orders.push(order);
        write_json(&self.dir, ORDERS_FILE, &orders)?;
        tables.orders = orders;
        Ok(())
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        let mut tables = self.tables.lock().await;
        let mut orders = tables.orders.clone();
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ShopError::OrderNotFound(id.to_string()))?;
        order.apply(patch)?;
        let updated = order.clone();
        write_json(&self.dir, ORDERS_FILE, &orders)?;
        tables.orders = orders;
        Ok(updated)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    async fn get_settings(&self) -> Result<Option<Settings>> {
        let tables = self.tables.lock().await;
        Ok(tables.settings.clone())
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        let mut tables = self.tables.lock().await;
        write_json(&self.dir, SETTINGS_FILE, &settings)?;
        tables.settings = Some(settings);
        Ok(())
    }

    async fn put_payment(&self, payment: PaymentRequest) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut payments = tables.payments.clone();
        match payments
            .iter_mut()
            .find(|p| p.reference == payment.reference)
        {
            Some(existing) => *existing = payment,
            None => payments.push(payment),
        }
        write_json(&self.dir, PAYMENTS_FILE, &payments)?;
        tables.payments = payments;
        Ok(())
    }

    async fn list_payments(&self, user_id: Option<&str>) -> Result<Vec<PaymentRequest>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .filter(|p| user_id.is_none_or(|u| p.user_id == u))
            .cloned()
            .collect())
    }
}
