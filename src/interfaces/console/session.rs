use super::command_reader::{Command, CommandReader, Request};
use super::replies;
use crate::application::accounts::AccountService;
use crate::application::engine::OrderEngine;
use crate::application::quotes::QuoteDesk;
use crate::domain::settings::Settings;
use crate::error::Result;
use crate::infrastructure::notifier::Envelope;
use std::io::{Read, Write};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Counts of a processed script.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub handled: usize,
    pub rejected: usize,
}

/// Console stand-in for the chat transport: turns each request into calls on
/// the application services and renders the outcome as one reply line.
pub struct ConsoleSession {
    engine: OrderEngine,
    accounts: AccountService,
    quotes: QuoteDesk,
}

impl ConsoleSession {
    pub fn new(engine: OrderEngine, accounts: AccountService, quotes: QuoteDesk) -> Self {
        Self {
            engine,
            accounts,
            quotes,
        }
    }

    /// Processes every row of `reader`, writing replies and the notifications
    /// they caused to `out`. Unreadable rows are reported on stderr and skipped.
    pub async fn run<R: Read, W: Write>(
        &self,
        reader: CommandReader<R>,
        out: &mut W,
        notices: &mut UnboundedReceiver<Envelope>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for request in reader.requests() {
            match request {
                Ok(request) => {
                    let reply = self.handle(&request).await;
                    writeln!(out, "[{}] {}", request.user_id, reply)?;
                    flush_notices(notices, out)?;
                    summary.handled += 1;
                }
                Err(e) => {
                    eprintln!("Error reading command: {}", e);
                    summary.rejected += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Handles one request and returns the reply text. Failures are rendered too.
    pub async fn handle(&self, request: &Request) -> String {
        debug!(user_id = %request.user_id, command = ?request.command, "handling command");
        match self.execute(&request.user_id, &request.command).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(user_id = %request.user_id, error = %e, recoverable = e.is_recoverable(), "command failed");
                replies::error(&e)
            }
        }
    }

    async fn execute(&self, user_id: &str, command: &Command) -> Result<String> {
        match command {
            Command::Start { username } => {
                let registration = self.accounts.register(user_id, username.as_deref()).await?;
                let mut reply = format!(
                    "Welcome, {}! Balance: {} coins",
                    registration.account.username, registration.account.coins
                );
                if registration.promoted {
                    reply.push_str(". You are now the admin");
                }
                Ok(reply)
            }
            Command::Balance => {
                let coins = self.accounts.balance(user_id).await?;
                Ok(format!("Balance: {} coins", coins))
            }
            Command::View { link } => {
                self.quotes.submit_link(user_id, link)?;
                let pricing = self.quotes.pricing();
                Ok(format!(
                    "Link received. How many views? ({} to {})",
                    pricing.min_quantity, pricing.max_quantity
                ))
            }
            Command::Quantity { input } => {
                let price = self.quotes.submit_quantity(user_id, input)?;
                Ok(replies::price_quote(input, price))
            }
            Command::Speed { option } => {
                let quote = self.quotes.choose_delivery(user_id, option)?;
                let created = self.engine.create_order(user_id, quote).await;
                self.quotes.discard(user_id);
                let order = created?;
                let balance = self.accounts.balance(user_id).await?;
                Ok(replies::order_placed(&order, balance))
            }
            Command::Abort => Ok(if self.quotes.discard(user_id) {
                "Order cancelled".to_string()
            } else {
                "Nothing to cancel".to_string()
            }),
            Command::Orders => {
                let orders = self.engine.orders_for(user_id).await?;
                Ok(replies::order_list(&orders, "You have no orders yet"))
            }
            Command::Pending => {
                let orders = self.engine.pending_orders(user_id).await?;
                Ok(replies::order_list(&orders, "You have no pending orders"))
            }
            Command::Cancel { order_id } => {
                let cancellation = self.engine.cancel_order(user_id, order_id).await?;
                Ok(replies::cancellation(&cancellation))
            }
            Command::Status { order_id } => {
                let status = self.engine.external_status(user_id, order_id).await?;
                Ok(replies::external_status(order_id, &status))
            }
            Command::Buy { coins } => {
                let request = self.accounts.request_coin_purchase(user_id, *coins).await?;
                Ok(replies::purchase(&request))
            }
            Command::Support => {
                let settings = self.accounts.settings().await?;
                Ok(format!("For help contact @{}", settings.support_contact))
            }
            Command::Grant {
                user_id: target,
                coins,
            } => {
                let account = self.accounts.grant_coins(user_id, target, *coins).await?;
                Ok(format!(
                    "Granted {} coins to {}. Their balance: {} coins",
                    coins, target, account.coins
                ))
            }
            Command::Price { price_per_1000 } => {
                let settings = self
                    .accounts
                    .set_price_per_1000(user_id, *price_per_1000)
                    .await?;
                Ok(format!(
                    "Price per 1000 coins set to ${}",
                    settings.price_per_coin_unit
                ))
            }
            Command::PaymentContact { name } => {
                let settings = self.accounts.set_payment_contact(user_id, name).await?;
                Ok(format!("Payment contact set to @{}", settings.payment_contact))
            }
            Command::SupportContact { name } => {
                let settings = self.accounts.set_support_contact(user_id, name).await?;
                Ok(format!("Support contact set to @{}", settings.support_contact))
            }
            Command::AddAdmin { user_id: target } => {
                let settings = self.accounts.add_admin(user_id, target).await?;
                Ok(admin_list(&settings))
            }
            Command::RemoveAdmin { user_id: target } => {
                let settings = self.accounts.remove_admin(user_id, target).await?;
                Ok(admin_list(&settings))
            }
            Command::Confirm { reference } => {
                let (payment, account) = self.accounts.confirm_payment(user_id, reference).await?;
                Ok(format!(
                    "Payment {} confirmed: {} coins credited to {}. Their balance: {} coins",
                    payment.reference, payment.coins, payment.user_id, account.coins
                ))
            }
            Command::Payments => {
                let payments = self.accounts.pending_payments(user_id).await?;
                Ok(replies::payment_list(&payments))
            }
        }
    }
}

fn admin_list(settings: &Settings) -> String {
    let ids: Vec<&str> = settings.admin_ids.iter().map(String::as_str).collect();
    format!("Admins: {}", ids.join(", "))
}

/// Writes every queued notification as a `(notice)` line.
pub fn flush_notices<W: Write>(notices: &mut UnboundedReceiver<Envelope>, out: &mut W) -> Result<usize> {
    let mut written = 0;
    while let Ok(envelope) = notices.try_recv() {
        writeln!(
            out,
            "[{}] (notice) {}",
            envelope.user_id,
            replies::notification(&envelope.notification)
        )?;
        written += 1;
    }
    Ok(written)
}
