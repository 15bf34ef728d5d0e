//! Domain types and pure policies of the storefront.
//!
//! Nothing in here performs I/O; the traits in [`ports`] are the seams the
//! application layer is wired through.

pub mod account;
pub mod delivery;
pub mod notification;
pub mod order;
pub mod payment;
pub mod ports;
pub mod pricing;
pub mod quote;
mod record;
pub mod settings;
