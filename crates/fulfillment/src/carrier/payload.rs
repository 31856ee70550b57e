//! Builds the carrier's ad-hoc order payload from an [`Order`].

use chrono::{DateTime, Utc};
use common::Money;
use domain::{Address, Order};
use serde::{Serialize, Serializer};

/// Parcel dimensions sent when the catalog has none (cm / kg).
const DEFAULT_LENGTH_CM: f64 = 10.0;
const DEFAULT_BREADTH_CM: f64 = 10.0;
const DEFAULT_HEIGHT_CM: f64 = 10.0;
const DEFAULT_WEIGHT_KG: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    #[serde(serialize_with = "as_decimal")]
    pub selling_price: Money,
    #[serde(serialize_with = "as_decimal")]
    pub discount: Money,
}

/// `POST /orders/create/adhoc` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentRequest {
    /// Our order number; the carrier echoes it back as the channel order id.
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,

    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,

    pub shipping_is_billing: bool,
    pub shipping_customer_name: String,
    pub shipping_last_name: String,
    pub shipping_address: String,
    pub shipping_address_2: String,
    pub shipping_city: String,
    pub shipping_pincode: String,
    pub shipping_state: String,
    pub shipping_country: String,
    pub shipping_email: String,
    pub shipping_phone: String,

    pub order_items: Vec<ShipmentItem>,
    /// `COD` or `Prepaid`.
    pub payment_method: String,
    #[serde(serialize_with = "as_decimal")]
    pub shipping_charges: Money,
    #[serde(serialize_with = "as_decimal")]
    pub total_discount: Money,
    #[serde(serialize_with = "as_decimal")]
    pub sub_total: Money,

    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

impl ShipmentRequest {
    /// Builds the payload for an order shipped from `pickup_location`.
    pub fn for_order(order: &Order, pickup_location: &str, now: DateTime<Utc>) -> Self {
        let billing = order.billing_or_shipping();
        let shipping = &order.shipping_address;
        let phone = order.contact_phone().map(normalize_phone).unwrap_or_default();
        let billing_phone = billing
            .phone
            .as_deref()
            .map(normalize_phone)
            .unwrap_or_else(|| phone.clone());
        let shipping_phone = shipping
            .phone
            .as_deref()
            .map(normalize_phone)
            .unwrap_or_else(|| phone.clone());
        let (billing_first, billing_last) = split_name(billing, &order.customer_name);
        let (shipping_first, shipping_last) = split_name(shipping, &order.customer_name);

        Self {
            order_id: order.order_number.clone(),
            order_date: now.format("%Y-%m-%d %H:%M").to_string(),
            pickup_location: pickup_location.to_string(),

            billing_customer_name: billing_first,
            billing_last_name: billing_last,
            billing_address: billing.line1.clone(),
            billing_address_2: billing.line2.clone().unwrap_or_default(),
            billing_city: billing.city.clone(),
            billing_pincode: billing.postal_code.clone(),
            billing_state: billing.state.clone(),
            billing_country: country_or_default(billing),
            billing_email: order.customer_email.clone(),
            billing_phone,

            shipping_is_billing: order.billing_address.is_none(),
            shipping_customer_name: shipping_first,
            shipping_last_name: shipping_last,
            shipping_address: shipping.line1.clone(),
            shipping_address_2: shipping.line2.clone().unwrap_or_default(),
            shipping_city: shipping.city.clone(),
            shipping_pincode: shipping.postal_code.clone(),
            shipping_state: shipping.state.clone(),
            shipping_country: country_or_default(shipping),
            shipping_email: order.customer_email.clone(),
            shipping_phone,

            order_items: order
                .items
                .iter()
                .map(|item| ShipmentItem {
                    name: item.product_name.clone(),
                    sku: item.sku.clone().unwrap_or_else(|| item.product_id.clone()),
                    units: item.quantity,
                    selling_price: item.unit_price,
                    discount: item.discount,
                })
                .collect(),
            payment_method: if order.cod { "COD" } else { "Prepaid" }.to_string(),
            shipping_charges: order.shipping_cost,
            total_discount: order.discount_amount,
            sub_total: order.subtotal,

            length: DEFAULT_LENGTH_CM,
            breadth: DEFAULT_BREADTH_CM,
            height: DEFAULT_HEIGHT_CM,
            weight: DEFAULT_WEIGHT_KG * order.total_quantity().max(1) as f64,
        }
    }
}

/// Strips everything but digits and keeps the last ten.
///
/// Shorter numbers are passed through as-is and left for the carrier to reject.
pub fn normalize_phone(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    let start = digits.len().saturating_sub(10);
    digits[start..].iter().collect()
}

fn split_name(address: &Address, fallback: &str) -> (String, String) {
    let full = address
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(fallback)
        .trim();
    match full.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (full.to_string(), String::new()),
    }
}

fn country_or_default(address: &Address) -> String {
    if address.country.trim().is_empty() {
        "India".to_string()
    } else {
        address.country.clone()
    }
}

fn as_decimal<S: Serializer>(amount: &Money, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(amount.cents() as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::{NewOrder, OrderItem};

    fn order() -> Order {
        let address = Address {
            name: Some("Anil Kumar Rao".to_string()),
            line1: "5 MG Road".to_string(),
            city: "Chennai".to_string(),
            state: "TN".to_string(),
            postal_code: "600001".to_string(),
            phone: Some("+91-98400 11223".to_string()),
            ..Default::default()
        };
        let mut new = NewOrder::new(
            "ORD-77",
            "Anil Rao",
            "anil@example.com",
            address,
            vec![OrderItem::new("P-3", "Bottle", 2, Money::from_cents(24_950))],
        );
        new.cod = true;
        Order::place(OrderId::new(), new, Utc::now())
    }

    #[test]
    fn test_normalize_phone_keeps_last_ten_digits() {
        assert_eq!(normalize_phone("+91 98400-11223"), "9840011223");
        assert_eq!(normalize_phone("09840011223"), "9840011223");
        assert_eq!(normalize_phone("12345"), "12345");
        assert_eq!(normalize_phone("n/a"), "");
    }

    #[test]
    fn test_request_uses_shipping_as_billing() {
        let request = ShipmentRequest::for_order(&order(), "Primary", Utc::now());

        assert!(request.shipping_is_billing);
        assert_eq!(request.billing_customer_name, "Anil");
        assert_eq!(request.billing_last_name, "Kumar Rao");
        assert_eq!(request.billing_phone, "9840011223");
        assert_eq!(request.billing_country, "India");
        assert_eq!(request.payment_method, "COD");
        assert_eq!(request.pickup_location, "Primary");
        assert_eq!(request.order_items[0].sku, "P-3");
        assert_eq!(request.weight, 1.0);
    }

    #[test]
    fn test_amounts_serialize_as_decimals() {
        let request = ShipmentRequest::for_order(&order(), "Primary", Utc::now());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sub_total"], serde_json::json!(499.0));
        assert_eq!(json["order_items"][0]["selling_price"], serde_json::json!(249.5));
    }

    #[test]
    fn test_weight_does_not_overflow_on_large_quantities() {
        let mut order = order();
        order.items = vec![
            OrderItem::new("P-4", "Tile", u32::MAX, Money::zero()),
            OrderItem::new("P-5", "Grout", 1, Money::zero()),
        ];

        let request = ShipmentRequest::for_order(&order, "Primary", Utc::now());

        assert_eq!(order.total_quantity(), u64::from(u32::MAX) + 1);
        assert_eq!(request.weight, DEFAULT_WEIGHT_KG * (u64::from(u32::MAX) + 1) as f64);
    }
}
