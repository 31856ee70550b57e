//! Order status machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its fulfillment lifecycle.
///
/// Transition table:
/// ```text
/// Pending ──► Confirmed ──► Shipped ──► OutForDelivery ──► Delivered
///    │            │            │  │             │
///    │            │            │  └──► Rto ◄────┘
///    └────────────┴────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, awaiting confirmation.
    #[default]
    Pending,

    /// Order accepted for fulfillment.
    Confirmed,

    /// Handed over to the carrier.
    Shipped,

    /// With the last-mile courier.
    OutForDelivery,

    /// Delivered to the customer (terminal state).
    Delivered,

    /// Cancelled before delivery (terminal state).
    Cancelled,

    /// Returned to origin by the carrier (terminal state).
    Rto,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Rto,
    ];

    /// Statuses reachable from this one under the strict table.
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
            OrderStatus::Confirmed => &[OrderStatus::Shipped, OrderStatus::Cancelled],
            OrderStatus::Shipped => &[
                OrderStatus::OutForDelivery,
                OrderStatus::Rto,
                OrderStatus::Cancelled,
            ],
            OrderStatus::OutForDelivery => &[OrderStatus::Delivered, OrderStatus::Rto],
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Rto => &[],
        }
    }

    /// Returns true if the strict table allows moving to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Returns true if reaching this status sends the customer an update.
    pub fn notifies_customer(&self) -> bool {
        matches!(
            self,
            OrderStatus::Shipped | OrderStatus::OutForDelivery | OrderStatus::Delivered
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rto => "rto",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// How strictly status changes are checked against the transition table.
///
/// Observed behaviour accepts any status after any other, so `Permissive`
/// is the default; `Strict` rejects moves outside [`OrderStatus::allowed_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    #[default]
    Permissive,
    Strict,
}

impl TransitionPolicy {
    /// Checks a requested status change. Re-stating the current status is always allowed.
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), DomainError> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Strict if from == to || from.can_transition_to(to) => Ok(()),
            TransitionPolicy::Strict => Err(DomainError::InvalidTransition { from, to }),
        }
    }
}
