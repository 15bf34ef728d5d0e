use super::ledger::Ledger;
use crate::domain::account::UserAccount;
use crate::domain::notification::Notification;
use crate::domain::payment::{PaymentRequest, PaymentStatus};
use crate::domain::ports::NotifierRef;
use crate::domain::settings::Settings;
use crate::error::{Result, ShopError};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of [`AccountService::register`].
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub account: UserAccount,
    /// The user became the first admin.
    pub promoted: bool,
}

/// A coin purchase request together with who to pay.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub payment: PaymentRequest,
    pub payment_contact: String,
}

/// Accounts, coin purchases and the admin-only settings operations.
///
/// Balance changes take the same per-user lock as the order engine.
#[derive(Clone)]
pub struct AccountService {
    ledger: Arc<Ledger>,
    notifier: NotifierRef,
}

impl AccountService {
    pub fn new(ledger: Arc<Ledger>, notifier: NotifierRef) -> Self {
        Self { ledger, notifier }
    }

    /// Creates the account if needed and records the display name. The first
    /// user to register while no admin exists becomes admin.
    pub async fn register(&self, user_id: &str, username: Option<&str>) -> Result<Registration> {
        let account = {
            let _guard = self.ledger.lock_user(user_id).await;
            let mut account = self.ledger.account(user_id).await?;
            let username = match username.map(str::trim) {
                Some(name) if !name.is_empty() => name.trim_start_matches('@').to_string(),
                _ if account.username.is_empty() => format!("user{}", user_id),
                _ => account.username.clone(),
            };
            if account.username != username {
                account.username = username;
                self.ledger.save_account(account.clone()).await?;
            }
            account
        };

        let mut promoted = false;
        self.ledger
            .update_settings(|settings| {
                if settings.admin_ids.is_empty() {
                    settings.admin_ids.insert(user_id.to_string());
                    promoted = true;
                }
                Ok(())
            })
            .await?;
        if promoted {
            info!(user_id, "first user promoted to admin");
        }
        Ok(Registration { account, promoted })
    }

    pub async fn balance(&self, user_id: &str) -> Result<u64> {
        let _guard = self.ledger.lock_user(user_id).await;
        Ok(self.ledger.account(user_id).await?.coins)
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.ledger.settings().await
    }

    pub async fn is_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self.ledger.settings().await?.is_admin(user_id))
    }

    /// Credits `amount` coins to `user_id`. Admin only.
    pub async fn grant_coins(&self, admin_id: &str, user_id: &str, amount: u64) -> Result<UserAccount> {
        self.require_admin(admin_id).await?;
        if amount == 0 {
            return Err(ShopError::Validation(
                "Amount must be a positive number of coins".to_string(),
            ));
        }
        let account = self.credit(user_id, amount).await?;
        info!(admin_id, user_id, amount, balance = account.coins, "coins granted");
        Ok(account)
    }

    /// Records a pending purchase of `coins` at the current price.
    pub async fn request_coin_purchase(&self, user_id: &str, coins: u64) -> Result<PurchaseRequest> {
        let settings = self.ledger.settings().await?;
        let payment = PaymentRequest::new(user_id, coins, settings.price_per_coin_unit, Utc::now())?;

        let existing = self.ledger.payments(Some(user_id)).await?;
        if existing.iter().any(|p| p.reference == payment.reference) {
            return Err(ShopError::Validation(
                "A purchase request was just created; please wait a moment before trying again"
                    .to_string(),
            ));
        }
        self.ledger.put_payment(payment.clone()).await?;
        info!(user_id, reference = %payment.reference, coins, price = %payment.price, "coin purchase requested");
        Ok(PurchaseRequest {
            payment,
            payment_contact: settings.payment_contact,
        })
    }

    /// Marks a purchase request as paid and credits its coins. Admin only.
    pub async fn confirm_payment(&self, admin_id: &str, reference: &str) -> Result<(PaymentRequest, UserAccount)> {
        self.require_admin(admin_id).await?;
        let user_id = self.payment(reference).await?.user_id;

        let (payment, account) = {
            let _guard = self.ledger.lock_user(&user_id).await;
            let mut payment = self.payment(reference).await?;
            payment.confirm()?;
            self.ledger.put_payment(payment.clone()).await?;

            let mut account = self.ledger.account(&user_id).await?;
            account.credit(payment.coins);
            self.ledger
                .save_account(account.clone())
                .await
                .inspect_err(|e| {
                    error!(user_id = %user_id, reference, coins = payment.coins, error = %e, "confirmed payment not credited")
                })?;
            (payment, account)
        };

        info!(admin_id, user_id = %user_id, reference, coins = payment.coins, "payment confirmed");
        self.notify_grant(&user_id, payment.coins, account.coins).await;
        Ok((payment, account))
    }

    /// Purchase requests still waiting for confirmation, oldest first. Admin only.
    pub async fn pending_payments(&self, admin_id: &str) -> Result<Vec<PaymentRequest>> {
        self.require_admin(admin_id).await?;
        let mut payments = self.ledger.payments(None).await?;
        payments.retain(|p| p.status == PaymentStatus::Pending);
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }

    pub async fn set_price_per_1000(&self, admin_id: &str, price: Decimal) -> Result<Settings> {
        self.require_admin(admin_id).await?;
        if price <= Decimal::ZERO {
            return Err(ShopError::Validation("Please enter a positive price".to_string()));
        }
        let settings = self
            .ledger
            .update_settings(|s| {
                s.price_per_coin_unit = price;
                Ok(())
            })
            .await?;
        info!(admin_id, %price, "coin price updated");
        Ok(settings)
    }

    pub async fn set_payment_contact(&self, admin_id: &str, contact: &str) -> Result<Settings> {
        self.require_admin(admin_id).await?;
        let contact = contact_name(contact)?;
        self.ledger
            .update_settings(|s| {
                s.payment_contact = contact;
                Ok(())
            })
            .await
    }

    pub async fn set_support_contact(&self, admin_id: &str, contact: &str) -> Result<Settings> {
        self.require_admin(admin_id).await?;
        let contact = contact_name(contact)?;
        self.ledger
            .update_settings(|s| {
                s.support_contact = contact;
                Ok(())
            })
            .await
    }

    pub async fn add_admin(&self, admin_id: &str, new_admin: &str) -> Result<Settings> {
        self.require_admin(admin_id).await?;
        let new_admin = new_admin.trim();
        if new_admin.is_empty() {
            return Err(ShopError::Validation("Please enter a user id".to_string()));
        }
        let settings = self
            .ledger
            .update_settings(|s| {
                if !s.admin_ids.insert(new_admin.to_string()) {
                    return Err(ShopError::Validation(format!(
                        "User {} is already an admin",
                        new_admin
                    )));
                }
                Ok(())
            })
            .await?;
        info!(admin_id, new_admin, "admin added");
        Ok(settings)
    }

    /// Revokes admin rights. The last admin cannot be removed.
    pub async fn remove_admin(&self, admin_id: &str, target: &str) -> Result<Settings> {
        self.require_admin(admin_id).await?;
        let target = target.trim();
        let settings = self
            .ledger
            .update_settings(|s| {
                if !s.admin_ids.contains(target) {
                    return Err(ShopError::Validation(format!("User {} is not an admin", target)));
                }
                if s.admin_ids.len() <= 1 {
                    return Err(ShopError::Validation("Cannot remove the last admin".to_string()));
                }
                s.admin_ids.remove(target);
                Ok(())
            })
            .await?;
        info!(admin_id, target, "admin removed");
        Ok(settings)
    }

    /// Adds configured admin ids to the stored settings.
    pub async fn merge_admins(&self, admin_ids: &[String]) -> Result<Settings> {
        self.ledger
            .update_settings(|s| {
                s.admin_ids.extend(admin_ids.iter().cloned());
                Ok(())
            })
            .await
    }

    async fn require_admin(&self, user_id: &str) -> Result<()> {
        if self.is_admin(user_id).await? {
            Ok(())
        } else {
            warn!(user_id, "admin operation refused");
            Err(ShopError::Forbidden(
                "You are not authorized to access admin functions".to_string(),
            ))
        }
    }

    async fn payment(&self, reference: &str) -> Result<PaymentRequest> {
        self.ledger
            .payments(None)
            .await?
            .into_iter()
            .find(|p| p.reference == reference)
            .ok_or_else(|| ShopError::Validation(format!("Unknown payment reference {}", reference)))
    }

    async fn credit(&self, user_id: &str, amount: u64) -> Result<UserAccount> {
        let account = {
            let _guard = self.ledger.lock_user(user_id).await;
            let mut account = self.ledger.account(user_id).await?;
            account.credit(amount);
            self.ledger.save_account(account.clone()).await?;
            account
        };
        self.notify_grant(user_id, amount, account.coins).await;
        Ok(account)
    }

    async fn notify_grant(&self, user_id: &str, amount: u64, balance: u64) {
        if let Err(e) = self
            .notifier
            .notify(user_id, Notification::CoinsGranted { amount, balance })
            .await
        {
            warn!(user_id, error = %e, "notification not delivered");
        }
    }
}

fn contact_name(input: &str) -> Result<String> {
    let name = input.trim().trim_start_matches('@');
    if name.is_empty() {
        return Err(ShopError::Validation("Please enter a username".to_string()));
    }
    Ok(name.to_string())
}
