use crate::error::{Result, ShopError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One raw row of a command script: `user, command, arg, extra`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CommandRow {
    pub user: String,
    pub command: String,
    #[serde(default)]
    pub arg: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
}

/// A user interaction, as the chat transport would deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { username: Option<String> },
    Balance,
    View { link: String },
    Quantity { input: String },
    Speed { option: String },
    Abort,
    Orders,
    Pending,
    Cancel { order_id: String },
    Status { order_id: String },
    Buy { coins: u64 },
    Support,
    Grant { user_id: String, coins: u64 },
    Price { price_per_1000: Decimal },
    PaymentContact { name: String },
    SupportContact { name: String },
    AddAdmin { user_id: String },
    RemoveAdmin { user_id: String },
    Confirm { reference: String },
    Payments,
}

/// A parsed command and the user who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub user_id: String,
    pub command: Command,
}

impl TryFrom<CommandRow> for Request {
    type Error = ShopError;

    fn try_from(row: CommandRow) -> Result<Self> {
        if row.user.is_empty() {
            return Err(ShopError::Validation("missing user".to_string()));
        }
        let CommandRow {
            user,
            command,
            arg,
            extra,
        } = row;
        let name = command.to_ascii_lowercase();
        let required = |what: &str| {
            arg.clone()
                .ok_or_else(|| ShopError::Validation(format!("{} needs {}", name, what)))
        };

        let command = match name.as_str() {
            "start" => Command::Start {
                username: arg.clone(),
            },
            "balance" => Command::Balance,
            "view" => Command::View {
                link: required("a post link")?,
            },
            "quantity" => Command::Quantity {
                input: required("a quantity")?,
            },
            "speed" => Command::Speed {
                option: required("a delivery option")?,
            },
            "abort" => Command::Abort,
            "orders" => Command::Orders,
            "pending" => Command::Pending,
            "cancel" => Command::Cancel {
                order_id: required("an order id")?,
            },
            "status" => Command::Status {
                order_id: required("an order id")?,
            },
            "buy" => Command::Buy {
                coins: parse_number(&required("a coin amount")?)?,
            },
            "support" => Command::Support,
            "grant" => Command::Grant {
                user_id: required("a user id")?,
                coins: parse_number(extra.as_deref().unwrap_or_default())?,
            },
            "price" => Command::Price {
                price_per_1000: Decimal::from_str(&required("a price")?)
                    .map_err(|_| ShopError::Validation("Please enter a valid number".to_string()))?,
            },
            "payment-contact" => Command::PaymentContact {
                name: required("a username")?,
            },
            "support-contact" => Command::SupportContact {
                name: required("a username")?,
            },
            "add-admin" => Command::AddAdmin {
                user_id: required("a user id")?,
            },
            "remove-admin" => Command::RemoveAdmin {
                user_id: required("a user id")?,
            },
            "confirm" => Command::Confirm {
                reference: required("a payment reference")?,
            },
            "payments" => Command::Payments,
            other => {
                return Err(ShopError::Validation(format!("unknown command: {}", other)));
            }
        };
        Ok(Request {
            user_id: user,
            command,
        })
    }
}

fn parse_number(input: &str) -> Result<u64> {
    input
        .trim()
        .replace([',', '_'], "")
        .parse()
        .map_err(|_| ShopError::Validation("Please enter a valid number".to_string()))
}

/// Reads command requests from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record
/// lengths, so trailing optional columns may be left out.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and parses requests; a bad row yields an error and
    /// reading continues with the next one.
    pub fn requests(self) -> impl Iterator<Item = Result<Request>> {
        self.reader
            .into_deserialize::<CommandRow>()
            .map(|result| result.map_err(ShopError::from).and_then(Request::try_from))
    }
}
