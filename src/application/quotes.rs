use crate::domain::delivery::plan_for_token;
use crate::domain::pricing::PricingPolicy;
use crate::domain::quote::{Quote, QuoteDraft, validate_post_link};
use crate::error::{Result, ShopError};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Per-user quote sessions for the multi-step order flow:
/// post link, then quantity, then delivery option.
///
/// Sessions live in memory only and are discarded once an order is placed,
/// the flow is aborted or the user cannot afford the quote.
#[derive(Default)]
pub struct QuoteDesk {
    pricing: PricingPolicy,
    drafts: Mutex<HashMap<String, QuoteDraft>>,
}

impl QuoteDesk {
    pub fn new(pricing: PricingPolicy) -> Self {
        Self {
            pricing,
            drafts: Mutex::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Opens a fresh session for `user_id`, replacing any unfinished one.
    pub fn start(&self, user_id: &str) {
        self.with_drafts(|drafts| drafts.insert(user_id.to_string(), QuoteDraft::default()));
        debug!(user_id, "quote started");
    }

    /// Validates and records the post link; opens a session if none is active.
    pub fn submit_link(&self, user_id: &str, link: &str) -> Result<String> {
        let link = validate_post_link(link)?;
        self.with_drafts(|drafts| {
            let draft = drafts.entry(user_id.to_string()).or_default();
            *draft = QuoteDraft {
                target_link: Some(link.clone()),
                ..QuoteDraft::default()
            };
        });
        Ok(link)
    }

    /// Records the quantity and returns its price in coins.
    pub fn submit_quantity(&self, user_id: &str, input: &str) -> Result<u64> {
        let quantity = self.pricing.parse_quantity(input)?;
        let price = self.pricing.price_for(quantity)?;
        self.with_drafts(|drafts| {
            let draft = drafts
                .get_mut(user_id)
                .filter(|d| d.target_link.is_some())
                .ok_or(ShopError::NoActiveQuote)?;
            draft.quantity = Some(quantity);
            draft.price = Some(price);
            Ok(price)
        })
    }

    /// Plans delivery for the quoted quantity and returns the complete quote.
    /// The session stays open until [`QuoteDesk::discard`].
    pub fn choose_delivery(&self, user_id: &str, token: &str) -> Result<Quote> {
        let draft = self
            .draft(user_id)
            .filter(|d| d.quantity.is_some())
            .ok_or(ShopError::NoActiveQuote)?;
        let plan = plan_for_token(token, draft.quantity.unwrap_or_default())?;
        draft.complete(plan).ok_or(ShopError::NoActiveQuote)
    }

    pub fn draft(&self, user_id: &str) -> Option<QuoteDraft> {
        self.with_drafts(|drafts| drafts.get(user_id).cloned())
    }

    /// Drops the user's session. Returns `false` if there was none.
    pub fn discard(&self, user_id: &str) -> bool {
        self.with_drafts(|drafts| drafts.remove(user_id).is_some())
    }

    fn with_drafts<T>(&self, f: impl FnOnce(&mut HashMap<String, QuoteDraft>) -> T) -> T {
        let mut drafts = self.drafts.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut drafts)
    }
}
