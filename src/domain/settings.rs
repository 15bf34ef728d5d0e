use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Global storefront settings, mutated only by admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub admin_ids: BTreeSet<String>,
    /// USD price of 1000 coins.
    #[serde(alias = "price_per_1000")]
    pub price_per_coin_unit: Decimal,
    #[serde(alias = "payment_username", alias = "payment_admin_username")]
    pub payment_contact: String,
    #[serde(alias = "support_username")]
    pub support_contact: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_ids: BTreeSet::new(),
            price_per_coin_unit: dec!(0.034),
            payment_contact: "AdminPaymentUser".to_string(),
            support_contact: "SupportUser".to_string(),
        }
    }
}

impl Settings {
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.contains(user_id)
    }
}
