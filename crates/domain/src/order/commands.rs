//! Order commands: placement payload and field updates.

use std::collections::BTreeSet;

use common::{AffiliateId, Money, UserId};

use crate::error::DomainError;

use super::{Address, OrderItem, OrderStatus, PaymentStatus};

/// Largest allowed gap, in minor units, between the stated total and
/// `subtotal - discount + shipping + tax`.
pub const TOTAL_TOLERANCE_CENTS: u64 = 1;

/// Largest quantity accepted on a single order line.
pub const MAX_ITEM_QUANTITY: u32 = 100_000;

/// Payload for placing a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Human-facing order number; unique across orders.
    pub order_number: String,

    /// Linked customer account, if the buyer is signed in.
    pub user_id: Option<UserId>,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    pub shipping_address: Address,
    pub billing_address: Option<Address>,

    pub items: Vec<OrderItem>,

    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,

    pub discount_code: Option<String>,
    pub discount_amount: Money,

    /// Loyalty coins the customer spent at checkout.
    pub coins_used: i64,

    /// Affiliate attribution carried by the order.
    pub affiliate_id: Option<AffiliateId>,

    pub payment_method: String,
    pub payment_status: PaymentStatus,

    /// Cash on delivery.
    pub cod: bool,

    pub tags: BTreeSet<String>,
}

impl NewOrder {
    /// Minimal payload with one item; totals are derived from the item.
    pub fn new(
        order_number: impl Into<String>,
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
        shipping_address: Address,
        items: Vec<OrderItem>,
    ) -> Self {
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        Self {
            order_number: order_number.into(),
            user_id: None,
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_phone: None,
            shipping_address,
            billing_address: None,
            items,
            subtotal,
            shipping_cost: Money::zero(),
            tax: Money::zero(),
            total: subtotal,
            discount_code: None,
            discount_amount: Money::zero(),
            coins_used: 0,
            affiliate_id: None,
            payment_method: "cod".to_string(),
            payment_status: PaymentStatus::Pending,
            cod: false,
            tags: BTreeSet::new(),
        }
    }

    /// The total implied by the order's components.
    pub fn expected_total(&self) -> Money {
        self.subtotal - self.discount_amount + self.shipping_cost + self.tax
    }

    /// [`expected_total`](Self::expected_total), or `None` on overflow.
    pub fn checked_expected_total(&self) -> Option<Money> {
        self.subtotal
            .checked_sub(self.discount_amount)?
            .checked_add(self.shipping_cost)?
            .checked_add(self.tax)
    }

    /// Validates required fields and the total invariant.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.order_number.trim().is_empty() {
            return Err(DomainError::validation("order_number is required"));
        }
        if self.customer_name.trim().is_empty() {
            return Err(DomainError::validation("customer_name is required"));
        }
        if !self.customer_email.contains('@') {
            return Err(DomainError::validation(
                "customer_email must be a valid email address",
            ));
        }
        if self.shipping_address.line1.trim().is_empty()
            || self.shipping_address.city.trim().is_empty()
        {
            return Err(DomainError::validation(
                "shipping_address requires line1 and city",
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "item {} has zero quantity",
                    item.product_id
                )));
            }
            if item.quantity > MAX_ITEM_QUANTITY {
                return Err(DomainError::validation(format!(
                    "item {} quantity exceeds {MAX_ITEM_QUANTITY}",
                    item.product_id
                )));
            }
            if item.unit_price.is_negative() || item.discount.is_negative() {
                return Err(DomainError::validation(format!(
                    "item {} has a negative amount",
                    item.product_id
                )));
            }
        }

        let amounts = [
            ("subtotal", self.subtotal),
            ("shipping_cost", self.shipping_cost),
            ("tax", self.tax),
            ("total", self.total),
            ("discount_amount", self.discount_amount),
        ];
        if let Some((name, _)) = amounts.iter().find(|(_, amount)| amount.is_negative()) {
            return Err(DomainError::validation(format!("{name} must not be negative")));
        }
        if self.coins_used < 0 {
            return Err(DomainError::validation("coins_used must not be negative"));
        }

        let item_totals = self.items.iter().try_fold(Money::zero(), |acc, item| {
            item.checked_line_total().and_then(|line| acc.checked_add(line))
        });
        if item_totals.is_none() {
            return Err(DomainError::validation("item amounts are out of range"));
        }

        let Some(expected) = self.checked_expected_total() else {
            return Err(DomainError::validation("order amounts are out of range"));
        };
        if self.total.abs_diff(expected) > TOTAL_TOLERANCE_CENTS {
            return Err(DomainError::validation(format!(
                "total {} does not match subtotal - discount + shipping + tax = {}",
                self.total, expected
            )));
        }

        Ok(())
    }

    /// Returns the discount code if one was actually supplied.
    pub fn normalized_discount_code(&self) -> Option<String> {
        self.discount_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
    }
}

/// A partial update to an order: status change, note and mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub note: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub tags: Option<BTreeSet<String>>,
    pub tracking_url: Option<String>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Returns the note if it carries any text.
    pub fn note(&self) -> Option<&str> {
        self.note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
    }

    /// Returns true if nothing at all was requested.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.note().is_none()
            && self.payment_status.is_none()
            && self.tags.is_none()
            && self.tracking_url.is_none()
    }
}
