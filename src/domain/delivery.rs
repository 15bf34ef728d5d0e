use crate::error::{Result, ShopError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Minutes between batches for the `slow` option.
pub const SLOW_INTERVAL_MINUTES: u32 = 30;
pub const SLOW_MIN_BATCH: u64 = 100;
pub const SLOW_MAX_BATCH: u64 = 1000;

/// Drip presets offered by the storefront.
pub const PRESET_DRIP_OPTIONS: [&str; 4] =
    ["drip_1_3_100", "drip_1_3_150", "drip_1_5_100", "drip_1_1_100"];

/// Delivery speed chosen by the user.
///
/// Serialized as its token (`immediate`, `slow`, `drip_<delay>_<interval>_<batch>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeliveryOption {
    Immediate,
    Slow,
    Drip {
        start_delay_minutes: u32,
        interval_minutes: u32,
        batch_size: u64,
    },
}

impl FromStr for DeliveryOption {
    type Err = ShopError;

    fn from_str(token: &str) -> Result<Self> {
        let token = token.trim().to_ascii_lowercase();
        match token.as_str() {
            "immediate" | "maximum" | "speed_maximum" => Ok(Self::Immediate),
            "slow" | "speed_slow" => Ok(Self::Slow),
            other => {
                let invalid = || ShopError::Validation(format!("Invalid delivery option: {}", other));
                let rest = other.strip_prefix("drip_").ok_or_else(invalid)?;
                let parts: Vec<&str> = rest.split('_').collect();
                let [delay, interval, batch] = parts.as_slice() else {
                    return Err(invalid());
                };
                let start_delay_minutes = delay.parse::<u32>().map_err(|_| invalid())?;
                let interval_minutes = interval.parse::<u32>().map_err(|_| invalid())?;
                let batch_size = batch.parse::<u64>().map_err(|_| invalid())?;
                if interval_minutes == 0 || batch_size == 0 {
                    return Err(invalid());
                }
                Ok(Self::Drip {
                    start_delay_minutes,
                    interval_minutes,
                    batch_size,
                })
            }
        }
    }
}

impl fmt::Display for DeliveryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Slow => write!(f, "slow"),
            Self::Drip {
                start_delay_minutes,
                interval_minutes,
                batch_size,
            } => write!(
                f,
                "drip_{}_{}_{}",
                start_delay_minutes, interval_minutes, batch_size
            ),
        }
    }
}

impl TryFrom<String> for DeliveryOption {
    type Error = ShopError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeliveryOption> for String {
    fn from(option: DeliveryOption) -> Self {
        option.to_string()
    }
}

/// Schedule descriptor consumed by the order engine.
///
/// `runs`/`interval_minutes` are `None` for immediate delivery, in which case
/// the external API receives no drip-feed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPlan {
    pub option: DeliveryOption,
    #[serde(default)]
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub runs: Option<u64>,
    #[serde(default)]
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub start_delay_minutes: u32,
}

impl DeliveryPlan {
    pub fn immediate() -> Self {
        Self {
            option: DeliveryOption::Immediate,
            batch_size: None,
            runs: None,
            interval_minutes: None,
            start_delay_minutes: 0,
        }
    }

    /// Drip-feed parameters `(runs, interval_minutes)` when both are set.
    pub fn drip_feed(&self) -> Option<(u64, u32)> {
        self.runs.zip(self.interval_minutes)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.start_delay_minutes) * 60)
    }

    /// Human-readable summary for notifications.
    pub fn description(&self) -> String {
        match (self.option, self.batch_size, self.runs) {
            (DeliveryOption::Immediate, _, _) => "Maximum Speed (Instant)".to_string(),
            (DeliveryOption::Slow, Some(batch), Some(runs)) => format!(
                "Slow (~{} views every {} min, {} batches)",
                batch,
                self.interval_minutes.unwrap_or(SLOW_INTERVAL_MINUTES),
                runs
            ),
            (
                DeliveryOption::Drip {
                    start_delay_minutes,
                    interval_minutes,
                    batch_size,
                },
                _,
                runs,
            ) => format!(
                "Starting after {} min, Every {} mins {} views ({} batches)",
                start_delay_minutes,
                interval_minutes,
                batch_size,
                runs.unwrap_or(1)
            ),
            (DeliveryOption::Slow, _, _) => "Slow".to_string(),
        }
    }
}

/// Builds the delivery schedule for `quantity` views.
pub fn plan_for(option: DeliveryOption, quantity: u64) -> DeliveryPlan {
    match option {
        DeliveryOption::Immediate => DeliveryPlan::immediate(),
        DeliveryOption::Slow => {
            let batch_size = (quantity / 10).clamp(SLOW_MIN_BATCH, SLOW_MAX_BATCH);
            DeliveryPlan {
                option,
                batch_size: Some(batch_size),
                runs: Some((quantity / batch_size).max(1)),
                interval_minutes: Some(SLOW_INTERVAL_MINUTES),
                start_delay_minutes: 0,
            }
        }
        DeliveryOption::Drip {
            start_delay_minutes,
            interval_minutes,
            batch_size,
        } => DeliveryPlan {
            option,
            batch_size: Some(batch_size),
            runs: Some((quantity / batch_size).max(1)),
            interval_minutes: Some(interval_minutes),
            start_delay_minutes,
        },
    }
}

/// Parses an option token and plans it; unknown tokens are a `Validation` error.
pub fn plan_for_token(token: &str, quantity: u64) -> Result<DeliveryPlan> {
    Ok(plan_for(token.parse()?, quantity))
}
