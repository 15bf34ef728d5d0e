use crate::domain::order::OrderStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient funds: need {required} coins, have {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("Order {order_id} cannot change state: it is {status}")]
    InvalidStateTransition { order_id: String, status: OrderStatus },
    #[error("{0}")]
    ExternalApi(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("No quote in progress; start again with a post link")]
    NoActiveQuote,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Notification not delivered: {0}")]
    Delivery(String),
}

impl ShopError {
    /// Errors the caller can fix by re-entering input or topping up.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ShopError::Validation(_) | ShopError::InsufficientFunds { .. } | ShopError::NoActiveQuote
        )
    }

    /// Shortfall in coins for an `InsufficientFunds` error.
    pub fn shortfall(&self) -> Option<u64> {
        match self {
            ShopError::InsufficientFunds {
                required,
                available,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShopError {
    fn from(e: std::io::Error) -> Self {
        ShopError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(e: serde_json::Error) -> Self {
        ShopError::Persistence(format!("corrupt record: {}", e))
    }
}

impl From<csv::Error> for ShopError {
    fn from(e: csv::Error) -> Self {
        ShopError::Validation(format!("malformed command row: {}", e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ShopError {
    fn from(e: rocksdb::Error) -> Self {
        ShopError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_names_shortfall() {
        let err = ShopError::InsufficientFunds {
            required: 500,
            available: 120,
        };
        assert_eq!(err.shortfall(), Some(380));
        assert!(err.to_string().contains("need 500 coins, have 120"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_external_api_error_is_verbatim() {
        let err = ShopError::ExternalApi("Incorrect service ID".to_string());
        assert_eq!(err.to_string(), "Incorrect service ID");
        assert!(!err.is_recoverable());
    }
}
