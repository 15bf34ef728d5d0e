use crate::error::{Result, ShopError};

pub const MIN_QUANTITY: u64 = 100;
pub const MAX_QUANTITY: u64 = 100_000;
pub const MINIMUM_PRICE: u64 = 10;

/// Maps a requested view quantity to its coin price.
///
/// One coin buys one view, floored at a minimum charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub min_quantity: u64,
    pub max_quantity: u64,
    pub minimum_price: u64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            min_quantity: MIN_QUANTITY,
            max_quantity: MAX_QUANTITY,
            minimum_price: MINIMUM_PRICE,
        }
    }
}

impl PricingPolicy {
    pub fn validate_quantity(&self, quantity: u64) -> Result<u64> {
        if quantity < self.min_quantity {
            return Err(ShopError::Validation(format!(
                "Minimum quantity is {} views",
                self.min_quantity
            )));
        }
        if quantity > self.max_quantity {
            return Err(ShopError::Validation(format!(
                "Maximum quantity is {} views",
                self.max_quantity
            )));
        }
        Ok(quantity)
    }

    /// Price in coins, rejecting out-of-range quantities.
    pub fn price_for(&self, quantity: u64) -> Result<u64> {
        let quantity = self.validate_quantity(quantity)?;
        Ok(quantity.max(self.minimum_price))
    }

    /// Parses free-text quantity input.
    pub fn parse_quantity(&self, input: &str) -> Result<u64> {
        let quantity = input
            .trim()
            .replace([',', '_'], "")
            .parse::<u64>()
            .map_err(|_| ShopError::Validation("Please enter a valid number".to_string()))?;
        self.validate_quantity(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_is_one_coin_per_view() {
        let policy = PricingPolicy::default();
        for q in [100, 101, 500, 9_999, 100_000] {
            assert_eq!(policy.price_for(q).unwrap(), q.max(10));
        }
    }

    #[test]
    fn test_price_rejects_out_of_range() {
        let policy = PricingPolicy::default();
        for q in [0, 1, 99, 100_001, u64::MAX] {
            assert!(matches!(
                policy.price_for(q),
                Err(ShopError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_minimum_price_floor_applies_with_low_bounds() {
        let policy = PricingPolicy {
            min_quantity: 1,
            ..PricingPolicy::default()
        };
        assert_eq!(policy.price_for(3).unwrap(), 10);
        assert_eq!(policy.price_for(11).unwrap(), 11);
    }

    #[test]
    fn test_parse_quantity() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.parse_quantity(" 10,000 ").unwrap(), 10_000);
        assert!(policy.parse_quantity("many").is_err());
        assert!(policy.parse_quantity("50").is_err());
    }
}
