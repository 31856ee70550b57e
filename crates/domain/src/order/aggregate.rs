//! Order aggregate implementation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{AffiliateId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{Address, NewOrder, OrderItem, OrderStatus, OrderUpdate, PaymentStatus};

/// Order aggregate root.
///
/// Owns the coin, discount, referral, shipment and history rows keyed by its id.
/// Never deleted; cancellation is a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
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
    pub coins_used: i64,
    pub affiliate_id: Option<AffiliateId>,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub cod: bool,
    pub status: OrderStatus,
    pub tags: BTreeSet<String>,
    pub tracking_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a fresh `Pending` order from a validated payload.
    pub fn place(id: OrderId, new: NewOrder, now: DateTime<Utc>) -> Self {
        let discount_code = new.normalized_discount_code();
        Self {
            id,
            order_number: new.order_number.trim().to_string(),
            user_id: new.user_id,
            customer_name: new.customer_name,
            customer_email: new.customer_email,
            customer_phone: new.customer_phone,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            items: new.items,
            subtotal: new.subtotal,
            shipping_cost: new.shipping_cost,
            tax: new.tax,
            total: new.total,
            discount_code,
            discount_amount: new.discount_amount,
            coins_used: new.coins_used,
            affiliate_id: new.affiliate_id,
            payment_method: new.payment_method,
            payment_status: new.payment_status,
            cod: new.cod,
            status: OrderStatus::Pending,
            tags: new.tags,
            tracking_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Billing block, falling back to the shipping address.
    pub fn billing_or_shipping(&self) -> &Address {
        self.billing_address.as_ref().unwrap_or(&self.shipping_address)
    }

    /// Best phone number on record for carrier contact.
    pub fn contact_phone(&self) -> Option<&str> {
        self.customer_phone
            .as_deref()
            .or(self.shipping_address.phone.as_deref())
    }

    /// Returns true if the shipment may be created: paid or COD, and a deliverable address.
    pub fn is_ready_to_ship(&self) -> bool {
        (self.payment_status == PaymentStatus::Paid || self.cod)
            && self.shipping_address.is_shippable()
    }

    pub fn total_quantity(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(u64::from(item.quantity)))
    }

    /// Applies the field changes of an update, excluding the note.
    ///
    /// Returns true if any column changed.
    pub fn apply_update(&mut self, update: &OrderUpdate, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if let Some(status) = update.status
            && status != self.status
        {
            self.status = status;
            changed = true;
        }
        if let Some(payment_status) = update.payment_status
            && payment_status != self.payment_status
        {
            self.payment_status = payment_status;
            changed = true;
        }
        if let Some(tags) = &update.tags
            && *tags != self.tags
        {
            self.tags = tags.clone();
            changed = true;
        }
        if let Some(url) = &update.tracking_url
            && self.tracking_url.as_ref() != Some(url)
        {
            self.tracking_url = Some(url.clone());
            changed = true;
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }
}
