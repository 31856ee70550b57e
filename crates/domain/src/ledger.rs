//! Ledger record types owned by an order.
//!
//! These are physically independent rows keyed by order id. The orchestrator,
//! not the store, keeps them consistent with the order.

use chrono::{DateTime, Utc};
use common::{AffiliateId, DiscountId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::OrderStatus;

/// Declares a snake_case string enum with `as_str` / `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(DomainError::validation(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(
    /// What a coin movement represents.
    CoinTransactionKind {
        Earned => "earned",
        Redeemed => "redeemed",
        ReferralCommission => "referral_commission",
        Adjustment => "adjustment",
    }
);

string_enum!(
    AffiliateStatus {
        Active => "active",
        Pending => "pending",
        Suspended => "suspended",
    }
);

string_enum!(
    ReferralStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Paid => "paid",
        Cancelled => "cancelled",
    }
);

string_enum!(
    ShipmentStatus {
        Created => "created",
        Cancelled => "cancelled",
    }
);

string_enum!(
    CancellationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

/// A customer account with its denormalized coin balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub coin_balance: i64,
}

/// One signed movement of a user's coins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub id: i64,
    pub user_id: UserId,
    /// Positive for credits, negative for debits.
    pub amount: i64,
    pub kind: CoinTransactionKind,
    pub status: String,
    pub order_id: Option<OrderId>,
    /// Unique per logical operation, e.g. `cashback:{order_id}`.
    pub idempotency_key: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A coin movement to be written by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoinTransaction {
    pub user_id: UserId,
    pub amount: i64,
    pub kind: CoinTransactionKind,
    pub order_id: Option<OrderId>,
    pub idempotency_key: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
}

impl NewCoinTransaction {
    /// Cashback credit for an order.
    pub fn cashback(user_id: UserId, order_id: OrderId, order_number: &str, coins: i64) -> Self {
        Self {
            user_id,
            amount: coins,
            kind: CoinTransactionKind::Earned,
            order_id: Some(order_id),
            idempotency_key: Some(format!("cashback:{order_id}")),
            description: format!("5% cashback on order {order_number}"),
            metadata: serde_json::json!({ "order_number": order_number, "source": "cashback" }),
        }
    }

    /// Debit of coins spent at checkout.
    pub fn redemption(user_id: UserId, order_id: OrderId, order_number: &str, coins: i64) -> Self {
        Self {
            user_id,
            amount: -coins,
            kind: CoinTransactionKind::Redeemed,
            order_id: Some(order_id),
            idempotency_key: Some(format!("redeem:{order_id}")),
            description: format!("Coins redeemed on order {order_number}"),
            metadata: serde_json::json!({ "order_number": order_number }),
        }
    }

    /// Commission converted to coins for an affiliate's linked account.
    pub fn referral_commission(
        user_id: UserId,
        order_id: OrderId,
        order_number: &str,
        affiliate_id: AffiliateId,
        coins: i64,
    ) -> Self {
        Self {
            user_id,
            amount: coins,
            kind: CoinTransactionKind::ReferralCommission,
            order_id: Some(order_id),
            idempotency_key: Some(format!("referral_commission:{order_id}")),
            description: format!("Referral commission for order {order_number}"),
            metadata: serde_json::json!({
                "order_number": order_number,
                "affiliate_id": affiliate_id,
            }),
        }
    }
}

/// A discount code definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub code: String,
    pub is_active: bool,
    pub usage_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Discount {
    /// Active and not past its expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// One use of a discount against an order. Unique on `(discount_id, order_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountUsage {
    pub id: i64,
    pub discount_id: DiscountId,
    pub order_id: OrderId,
    pub customer_email: String,
    pub discount_amount: Money,
    pub created_at: DateTime<Utc>,
}

/// A discount use to be recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiscountUsage {
    pub discount_id: DiscountId,
    pub order_id: OrderId,
    pub customer_email: String,
    pub discount_amount: Money,
}

/// An affiliate partner and its running totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliate {
    pub id: AffiliateId,
    /// Customer account receiving commission coins, if linked.
    pub user_id: Option<UserId>,
    pub status: AffiliateStatus,
    pub total_referrals: i64,
    pub total_earnings: Money,
    pub pending_earnings: Money,
}

/// Commission earned by an affiliate on one order. Unique on `(affiliate_id, order_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateReferral {
    pub id: i64,
    pub affiliate_id: AffiliateId,
    pub order_id: OrderId,
    pub commission_rate_bps: u32,
    pub commission_earned: Money,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
}

/// A referral to be recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReferral {
    pub affiliate_id: AffiliateId,
    pub order_id: OrderId,
    pub commission_rate_bps: u32,
    pub commission_earned: Money,
}

/// The single current carrier shipment of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub order_id: OrderId,
    pub carrier_order_id: Option<String>,
    pub carrier_shipment_id: Option<String>,
    pub status: ShipmentStatus,
    pub awb_code: Option<String>,
    pub tracking_url: Option<String>,
    pub label_url: Option<String>,
    pub pickup_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry of an order status change or note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: OrderId,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A history entry to be appended by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub order_id: OrderId,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub note: Option<String>,
}

/// Audit record of an order cancellation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancellation {
    pub id: i64,
    pub order_id: OrderId,
    pub status: CancellationStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CancellationStatus {
    /// Open cancellations block creating another one.
    pub fn is_open(&self) -> bool {
        matches!(self, CancellationStatus::Pending | CancellationStatus::Approved)
    }
}
