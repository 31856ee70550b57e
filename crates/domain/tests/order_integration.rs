//! Integration tests for the Order aggregate.
//!
//! These tests walk an order through its status lifecycle and check the
//! placement invariants that every stored order must satisfy.

use chrono::Utc;
use common::{AffiliateId, Money, OrderId, UserId};
use domain::loyalty::{DEFAULT_COMMISSION_RATE_BPS, cashback_coins, coins_for, commission_for};
use domain::{
    Address, DomainError, NewOrder, Order, OrderItem, OrderStatus, OrderUpdate, PaymentStatus,
    TransitionPolicy,
};

fn address() -> Address {
    Address {
        name: Some("Meera Iyer".to_string()),
        line1: "7 Park Street".to_string(),
        city: "Kolkata".to_string(),
        state: "WB".to_string(),
        postal_code: "700016".to_string(),
        country: "India".to_string(),
        phone: Some("+91 98300 12345".to_string()),
        ..Default::default()
    }
}

fn new_order() -> NewOrder {
    NewOrder::new(
        "ORD-2001",
        "Meera Iyer",
        "meera@example.com",
        address(),
        vec![
            OrderItem::new("P-1", "Tea Set", 1, Money::from_units(1500)),
            OrderItem::new("P-2", "Tea Leaves", 2, Money::from_units(250)),
        ],
    )
}

mod placement {
    use super::*;

    #[test]
    fn placed_order_keeps_total_invariant() {
        let mut payload = new_order();
        payload.discount_code = Some("WELCOME".to_string());
        payload.discount_amount = Money::from_units(200);
        payload.shipping_cost = Money::from_units(80);
        payload.tax = Money::from_cents(9_999);
        payload.total = payload.expected_total();
        payload.validate().unwrap();

        let order = Order::place(OrderId::new(), payload, Utc::now());
        let recomputed = order.subtotal - order.discount_amount + order.shipping_cost + order.tax;
        assert!(order.total.abs_diff(recomputed) <= 1);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.discount_code.as_deref(), Some("WELCOME"));
    }

    #[test]
    fn mismatched_total_is_a_validation_error() {
        let mut payload = new_order();
        payload.total = payload.total + Money::from_cents(2);
        let err = payload.validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("total")));
    }

    #[test]
    fn missing_customer_email_is_rejected() {
        let mut payload = new_order();
        payload.customer_email = "not-an-email".to_string();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn contact_phone_falls_back_to_address() {
        let order = Order::place(OrderId::new(), new_order(), Utc::now());
        assert_eq!(order.contact_phone(), Some("+91 98300 12345"));
        assert_eq!(order.billing_or_shipping(), &order.shipping_address);
    }
}

mod status_lifecycle {
    use super::*;

    #[test]
    fn strict_happy_path_to_delivered() {
        let policy = TransitionPolicy::Strict;
        let mut order = Order::place(OrderId::new(), new_order(), Utc::now());

        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            policy.check(order.status, next).unwrap();
            assert!(order.apply_update(&OrderUpdate::status(next), Utc::now()));
        }

        assert!(order.status.is_terminal());
        assert!(
            policy
                .check(order.status, OrderStatus::Cancelled)
                .is_err()
        );
    }

    #[test]
    fn permissive_policy_allows_reopening() {
        let policy = TransitionPolicy::Permissive;
        assert!(
            policy
                .check(OrderStatus::Cancelled, OrderStatus::Pending)
                .is_ok()
        );
    }

    #[test]
    fn update_changes_mutable_fields() {
        let mut order = Order::place(OrderId::new(), new_order(), Utc::now());
        let update = OrderUpdate {
            payment_status: Some(PaymentStatus::Paid),
            tags: Some(["gift".to_string()].into_iter().collect()),
            tracking_url: Some("https://track.example/AWB1".to_string()),
            ..Default::default()
        };

        assert!(order.apply_update(&update, Utc::now()));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(order.tags.contains("gift"));
        assert!(order.is_ready_to_ship());

        // Re-applying the same update changes nothing.
        assert!(!order.apply_update(&update, Utc::now()));
    }
}

mod loyalty {
    use super::*;

    #[test]
    fn cashback_for_linked_customer_order() {
        let mut payload = new_order();
        payload.user_id = Some(UserId::new(9));
        let order = Order::place(OrderId::new(), payload, Utc::now());
        // total 2000.00 -> 1000 coins
        assert_eq!(cashback_coins(order.total), 1000);
    }

    #[test]
    fn commission_for_attributed_order() {
        let mut payload = new_order();
        payload.affiliate_id = Some(AffiliateId::new(42));
        let order = Order::place(OrderId::new(), payload, Utc::now());

        let commission = commission_for(order.total, DEFAULT_COMMISSION_RATE_BPS);
        assert_eq!(commission, Money::from_units(200));
        assert_eq!(coins_for(commission), 2000);
    }
}
