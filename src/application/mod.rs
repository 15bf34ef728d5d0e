//! Application layer orchestrating the storefront.
//!
//! The [`ledger::Ledger`] repository owns every store access and the per-user
//! locks. [`engine::OrderEngine`] drives the order lifecycle on top of it,
//! while [`accounts::AccountService`] and [`quotes::QuoteDesk`] cover the
//! remaining user and admin interactions.

pub mod accounts;
pub mod engine;
pub mod ledger;
pub mod locks;
pub mod quotes;
pub mod scheduler;
