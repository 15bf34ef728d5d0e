use super::delivery::DeliveryPlan;
use crate::error::{Result, ShopError};
use serde::{Deserialize, Serialize};
use url::Url;

const POST_HOST: &str = "t.me";

/// A fully priced request, ready to become an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub target_link: String,
    pub quantity: u64,
    pub price: u64,
    pub delivery: DeliveryPlan,
}

/// Partially filled quote, built up over several interactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteDraft {
    pub target_link: Option<String>,
    pub quantity: Option<u64>,
    pub price: Option<u64>,
}

impl QuoteDraft {
    /// Completes the draft with a delivery plan, if link and quantity are set.
    pub fn complete(&self, delivery: DeliveryPlan) -> Option<Quote> {
        Some(Quote {
            target_link: self.target_link.clone()?,
            quantity: self.quantity?,
            price: self.price?,
            delivery,
        })
    }
}

/// Accepts `http(s)://t.me/<path>` post links.
pub fn validate_post_link(input: &str) -> Result<String> {
    let invalid = || {
        ShopError::Validation(
            "Invalid link format. Please send a valid Telegram post link (https://t.me/...)"
                .to_string(),
        )
    };
    let link = input.trim();
    let url = Url::parse(link).map_err(|_| invalid())?;
    let has_path = url.path_segments().is_some_and(|mut s| s.any(|seg| !seg.is_empty()));
    if !matches!(url.scheme(), "http" | "https") || url.host_str() != Some(POST_HOST) || !has_path
    {
        return Err(invalid());
    }
    Ok(link.to_string())
}
