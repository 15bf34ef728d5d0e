use super::record::{as_text, as_timestamp, as_u64};
use crate::error::{Result, ShopError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A storefront customer and their coin balance.
///
/// Balances are whole coins and can never go negative: every debit goes
/// through [`UserAccount::debit`], which checks the balance first.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserAccount {
    /// Stable external identifier of the user.
    pub id: String,
    /// Spendable coins.
    pub coins: u64,
    /// Display name, possibly empty.
    #[serde(default)]
    pub username: String,
    /// Set once when the account is first referenced.
    pub join_date: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(id: impl Into<String>, join_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            coins: 0,
            username: String::new(),
            join_date,
        }
    }

    /// Removes `amount` coins if the balance covers it.
    pub fn debit(&mut self, amount: u64) -> Result<()> {
        if self.coins >= amount {
            self.coins -= amount;
            Ok(())
        } else {
            Err(ShopError::InsufficientFunds {
                required: amount,
                available: self.coins,
            })
        }
    }

    /// Adds coins unconditionally (refunds and admin grants).
    pub fn credit(&mut self, amount: u64) {
        self.coins = self.coins.saturating_add(amount);
    }
}

/// Reads a stored account record keyed by `id`, accepting older shapes
/// (missing `id`, string timestamps, stray session fields).
pub fn normalize_account_record(id: &str, record: &Value, now: DateTime<Utc>) -> UserAccount {
    if let Ok(account) = serde_json::from_value::<UserAccount>(record.clone())
        && account.id == id
    {
        return account;
    }
    UserAccount {
        id: id.to_string(),
        coins: record.get("coins").and_then(as_u64).unwrap_or(0),
        username: record
            .get("username")
            .and_then(as_text)
            .unwrap_or_default(),
        join_date: record
            .get("join_date")
            .and_then(as_timestamp)
            .unwrap_or(now),
    }
}
