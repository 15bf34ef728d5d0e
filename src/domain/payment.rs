use crate::error::{Result, ShopError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MIN_COIN_PURCHASE: u64 = 1000;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
}

/// A user's request to buy coins, settled manually by the payment contact.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRequest {
    pub reference: String,
    pub user_id: String,
    pub coins: u64,
    /// Price in USD.
    pub price: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn new(
        user_id: impl Into<String>,
        coins: u64,
        price_per_1000: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if coins < MIN_COIN_PURCHASE {
            return Err(ShopError::Validation(format!(
                "Minimum purchase is {} coins",
                MIN_COIN_PURCHASE
            )));
        }
        let user_id = user_id.into();
        Ok(Self {
            reference: format!("PMT-{}-{}", user_id, now.timestamp()),
            price: price_for_coins(coins, price_per_1000),
            user_id,
            coins,
            status: PaymentStatus::Pending,
            created_at: now,
        })
    }

    /// Marks the request as paid. A request can only be confirmed once.
    pub fn confirm(&mut self) -> Result<()> {
        if self.status == PaymentStatus::Confirmed {
            return Err(ShopError::Validation(format!(
                "Payment {} is already confirmed",
                self.reference
            )));
        }
        self.status = PaymentStatus::Confirmed;
        Ok(())
    }
}

/// USD price of `coins`, rounded to cents.
pub fn price_for_coins(coins: u64, price_per_1000: Decimal) -> Decimal {
    (Decimal::from(coins) / Decimal::from(1000) * price_per_1000).round_dp(2)
}
