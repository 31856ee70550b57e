//! Domain layer for the order fulfillment ledger.
//!
//! This crate provides:
//! - The order aggregate with its placement validation and field updates
//! - The order status machine and transition policy
//! - Ledger record types (coin transactions, discount usage, referrals, shipments, history)
//! - Loyalty arithmetic (cashback, affiliate commission, coin conversion)

pub mod error;
pub mod ledger;
pub mod loyalty;
pub mod order;

pub use error::DomainError;
pub use ledger::{
    Affiliate, AffiliateReferral, AffiliateStatus, CancellationStatus, CoinTransaction,
    CoinTransactionKind, Discount, DiscountUsage, NewCoinTransaction, NewDiscountUsage,
    NewHistoryEntry, NewReferral, OrderCancellation, OrderStatusHistory, ReferralStatus, Shipment,
    ShipmentStatus, User,
};
pub use order::{
    Address, NewOrder, Order, OrderItem, OrderStatus, OrderUpdate, PaymentStatus,
    TransitionPolicy,
};
