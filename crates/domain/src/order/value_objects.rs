//! Value objects for the order domain.

use common::Money;
use serde::{Deserialize, Serialize};

/// Postal address used for shipping and billing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Address {
    /// Returns true if the carrier has enough to deliver: address line, city and postal code.
    pub fn is_shippable(&self) -> bool {
        !self.line1.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.postal_code.trim().is_empty()
    }
}

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Reference into the product catalog.
    pub product_id: String,

    pub product_name: String,

    #[serde(default)]
    pub sku: Option<String>,

    pub quantity: u32,

    /// Price per unit.
    pub unit_price: Money,

    /// Discount applied to this line as a whole.
    #[serde(default)]
    pub discount: Money,
}

impl OrderItem {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            sku: None,
            quantity,
            unit_price,
            discount: Money::zero(),
        }
    }

    /// Returns the line total (quantity * unit_price - discount).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity) - self.discount
    }

    /// Line total, or `None` if it does not fit in minor units.
    pub fn checked_line_total(&self) -> Option<Money> {
        self.unit_price
            .checked_mul(self.quantity)?
            .checked_sub(self.discount)
    }
}

/// Payment state as reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(crate::DomainError::validation(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}
