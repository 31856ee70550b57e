//! Shared identifier and money types used across the order fulfillment crates.

pub mod ids;
pub mod money;

pub use ids::{AffiliateId, DiscountId, OrderId, UserId};
pub use money::Money;
