//! Integration tests for order creation side effects and status transitions.

use std::sync::Arc;
use std::time::Duration;

use common::{AffiliateId, DiscountId, Money, UserId};
use domain::{
    Address, Affiliate, AffiliateStatus, CancellationStatus, CoinTransactionKind, Discount,
    NewOrder, OrderItem, OrderStatus, OrderUpdate, PaymentStatus, ShipmentStatus,
    TransitionPolicy, User,
};
use fulfillment::steps::default_steps;
use fulfillment::{
    AppliedFact, CarrierClient, CarrierError, FulfillmentContext, FulfillmentError,
    FulfillmentSettings, HttpCarrierClient, InMemoryCarrier, Notification, OrderOrchestrator,
    RecordingNotifier, StaticTokenProvider, StepKind, StepResult,
};
use ledger_store::{InMemoryLedgerStore, LedgerStore, LedgerStoreExt};

struct TestHarness {
    orchestrator: OrderOrchestrator,
    store: Arc<InMemoryLedgerStore>,
    carrier: InMemoryCarrier,
    notifier: RecordingNotifier,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_settings(FulfillmentSettings::default())
    }

    fn with_settings(settings: FulfillmentSettings) -> Self {
        let carrier = InMemoryCarrier::new();
        Self::build(Arc::new(carrier.clone()), carrier, settings)
    }

    fn with_carrier(client: Arc<dyn CarrierClient>) -> Self {
        Self::build(client, InMemoryCarrier::new(), FulfillmentSettings::default())
    }

    fn build(
        client: Arc<dyn CarrierClient>,
        carrier: InMemoryCarrier,
        settings: FulfillmentSettings,
    ) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let notifier = RecordingNotifier::new();
        let ctx = FulfillmentContext::new(
            store.clone(),
            client,
            store.clone(),
            Arc::new(notifier.clone()),
        )
        .with_settings(settings);

        Self {
            orchestrator: OrderOrchestrator::new(Arc::new(ctx)),
            store,
            carrier,
            notifier,
        }
    }

    async fn seed_user(&self, id: i64, balance: i64) -> UserId {
        let user_id = UserId::new(id);
        self.store
            .insert_user(User {
                id: user_id,
                email: format!("user{id}@example.com"),
                coin_balance: balance,
            })
            .await;
        user_id
    }

    async fn balance(&self, user_id: UserId) -> i64 {
        self.store
            .get_user(user_id)
            .await
            .unwrap()
            .unwrap()
            .coin_balance
    }
}

fn address() -> Address {
    Address {
        name: Some("Asha Rao".to_string()),
        line1: "12 Park Street".to_string(),
        city: "Kolkata".to_string(),
        state: "WB".to_string(),
        postal_code: "700016".to_string(),
        country: "India".to_string(),
        phone: Some("+91 98300 12345".to_string()),
        ..Default::default()
    }
}

/// A COD order whose total is `units` with one line item.
fn new_order(number: &str, units: i64) -> NewOrder {
    let mut order = NewOrder::new(
        number,
        "Asha Rao",
        "asha@example.com",
        address(),
        vec![OrderItem::new("P-1", "Silk Saree", 1, Money::from_units(units))],
    );
    order.cod = true;
    order
}

fn outcome(placement: &fulfillment::OrderPlacement, step: StepKind) -> &StepResult {
    &placement
        .outcomes
        .iter()
        .find(|o| o.step == step)
        .unwrap()
        .result
}

#[tokio::test]
async fn test_scenario_a_cashback_on_thousand() {
    let h = TestHarness::new();
    let user_id = h.seed_user(1, 0).await;

    let mut new = new_order("ORD-A", 1000);
    new.user_id = Some(user_id);
    let placement = h.orchestrator.create_order(new).await.unwrap();

    assert_eq!(placement.order.status, OrderStatus::Pending);
    assert_eq!(placement.order.total, Money::from_units(1000));
    assert_eq!(placement.failed_steps().count(), 0);

    let transactions = h.store.coin_transactions_for_user(user_id).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].amount, 500);
    assert_eq!(transactions[0].kind, CoinTransactionKind::Earned);
    assert_eq!(h.balance(user_id).await, 500);

    // Fresh orders have no history
    let history = h
        .orchestrator
        .order_history(placement.order.id)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_scenario_b_overdraft_debit_refused_order_kept() {
    let h = TestHarness::new();
    let user_id = h.seed_user(2, 150).await;

    let mut new = new_order("ORD-B", 100);
    new.user_id = Some(user_id);
    new.coins_used = 200;
    let placement = h.orchestrator.create_order(new).await.unwrap();

    assert!(matches!(
        outcome(&placement, StepKind::CoinDebit),
        StepResult::Failed(_)
    ));
    assert_eq!(h.store.order_count().await, 1);

    let transactions = h.store.coin_transactions_for_user(user_id).await.unwrap();
    assert!(
        transactions
            .iter()
            .all(|tx| tx.kind != CoinTransactionKind::Redeemed)
    );
    // Only the cashback on 100 units landed
    assert_eq!(h.balance(user_id).await, 150 + 50);

    let reconciliation = h.store.reconcile_coin_balance(user_id).await.unwrap();
    assert_eq!(reconciliation.ledger_sum, 50);
}

#[tokio::test]
async fn test_coin_debit_applies_with_sufficient_balance() {
    let h = TestHarness::new();
    let user_id = h.seed_user(3, 300).await;

    let mut new = new_order("ORD-B2", 100);
    new.user_id = Some(user_id);
    new.coins_used = 200;
    h.orchestrator.create_order(new).await.unwrap();

    assert_eq!(h.balance(user_id).await, 300 - 200 + 50);
    let reconciliation = h.store.reconcile_coin_balance(user_id).await.unwrap();
    assert_eq!(reconciliation.ledger_sum, -200 + 50);
}

#[tokio::test]
async fn test_scenario_c_affiliate_commission() {
    let h = TestHarness::new();
    let affiliate_user = h.seed_user(50, 0).await;
    h.store
        .insert_affiliate(Affiliate {
            id: AffiliateId::new(42),
            user_id: Some(affiliate_user),
            status: AffiliateStatus::Active,
            total_referrals: 0,
            total_earnings: Money::zero(),
            pending_earnings: Money::zero(),
        })
        .await;
    h.store.set_commission_rate(Some(1_000)).await;

    let mut new = new_order("ORD-C", 2000);
    new.affiliate_id = Some(AffiliateId::new(42));
    let placement = h.orchestrator.create_order(new).await.unwrap();

    let referrals = h
        .store
        .referrals_for_order(placement.order.id)
        .await
        .unwrap();
    assert_eq!(referrals.len(), 1);
    assert_eq!(referrals[0].commission_earned, Money::from_units(200));
    assert_eq!(referrals[0].commission_rate_bps, 1_000);

    let affiliate = h
        .store
        .get_affiliate(AffiliateId::new(42))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(affiliate.total_referrals, 1);
    assert_eq!(affiliate.pending_earnings, Money::from_units(200));
    assert_eq!(affiliate.total_earnings, Money::from_units(200));

    // 200 units of commission at 10 coins per unit
    assert_eq!(h.balance(affiliate_user).await, 2_000);
}

#[tokio::test]
async fn test_inactive_affiliate_fails_step_only() {
    let h = TestHarness::new();
    h.store
        .insert_affiliate(Affiliate {
            id: AffiliateId::new(9),
            user_id: None,
            status: AffiliateStatus::Suspended,
            total_referrals: 0,
            total_earnings: Money::zero(),
            pending_earnings: Money::zero(),
        })
        .await;

    let mut new = new_order("ORD-C2", 500);
    new.affiliate_id = Some(AffiliateId::new(9));
    let placement = h.orchestrator.create_order(new).await.unwrap();

    assert!(matches!(
        outcome(&placement, StepKind::AffiliateCommission),
        StepResult::Failed(_)
    ));
    assert!(
        h.store
            .referrals_for_order(placement.order.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_scenario_d_pickup_location_retried_once() {
    let h = TestHarness::new();
    h.carrier
        .push_create_response(Err(CarrierError::PickupLocation {
            message: "Wrong Pickup location entered".to_string(),
            suggested: Some("Warehouse-East".to_string()),
        }))
        .await;

    let placement = h
        .orchestrator
        .create_order(new_order("ORD-D", 750))
        .await
        .unwrap();

    let calls = h.carrier.create_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].pickup_location, "Primary");
    assert_eq!(calls[1].pickup_location, "Warehouse-East");

    assert_eq!(
        outcome(&placement, StepKind::Shipment),
        &StepResult::Applied(AppliedFact::ShipmentCreated {
            shipment_id: Some("SH-0001".to_string()),
            pickup_location: "Warehouse-East".to_string(),
            retried: true,
        })
    );

    let shipment = h
        .orchestrator
        .order_shipment(placement.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Created);
    assert_eq!(shipment.pickup_location.as_deref(), Some("Warehouse-East"));
}

#[tokio::test]
async fn test_second_pickup_error_is_not_retried_again() {
    let h = TestHarness::new();
    for _ in 0..2 {
        h.carrier
            .push_create_response(Err(CarrierError::PickupLocation {
                message: "Wrong Pickup location entered".to_string(),
                suggested: Some("Warehouse-East".to_string()),
            }))
            .await;
    }

    let placement = h
        .orchestrator
        .create_order(new_order("ORD-D2", 750))
        .await
        .unwrap();

    assert_eq!(h.carrier.create_calls().await.len(), 2);
    assert!(matches!(
        outcome(&placement, StepKind::Shipment),
        StepResult::Failed(_)
    ));
    assert!(
        h.store
            .get_shipment(placement.order.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_other_carrier_errors_are_not_retried() {
    let h = TestHarness::new();
    h.carrier
        .push_create_response(Err(CarrierError::Rejected {
            status: 422,
            message: "Invalid delivery pincode".to_string(),
        }))
        .await;

    let placement = h
        .orchestrator
        .create_order(new_order("ORD-D3", 750))
        .await
        .unwrap();

    assert_eq!(h.carrier.create_calls().await.len(), 1);
    assert!(matches!(
        outcome(&placement, StepKind::Shipment),
        StepResult::Failed(_)
    ));
    assert_eq!(placement.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_pickup_error_without_suggestion_is_not_retried() {
    let h = TestHarness::new();
    h.carrier
        .push_create_response(Err(CarrierError::PickupLocation {
            message: "Wrong Pickup location entered".to_string(),
            suggested: None,
        }))
        .await;

    h.orchestrator
        .create_order(new_order("ORD-D4", 750))
        .await
        .unwrap();

    assert_eq!(h.carrier.create_calls().await.len(), 1);
}

#[tokio::test]
async fn test_unpaid_prepaid_order_skips_shipment() {
    let h = TestHarness::new();
    let mut new = new_order("ORD-E", 400);
    new.cod = false;
    new.payment_status = PaymentStatus::Pending;

    let placement = h.orchestrator.create_order(new).await.unwrap();

    assert!(matches!(
        outcome(&placement, StepKind::Shipment),
        StepResult::Applied(AppliedFact::Skipped { .. })
    ));
    assert!(h.carrier.create_calls().await.is_empty());
}

#[tokio::test]
async fn test_discount_usage_counted_once_across_reruns() {
    let h = TestHarness::new();
    h.store
        .insert_discount(Discount {
            id: DiscountId::new(5),
            code: "DIWALI10".to_string(),
            is_active: true,
            usage_count: 3,
            expires_at: None,
        })
        .await;

    let mut new = new_order("ORD-F", 1000);
    new.discount_code = Some("diwali10".to_string());
    new.discount_amount = Money::from_units(100);
    new.total = Money::from_units(900);
    let placement = h.orchestrator.create_order(new).await.unwrap();

    // Re-running every step must not double count anything
    let ctx = h.orchestrator.context();
    for step in default_steps() {
        if step.kind() != StepKind::Shipment {
            step.apply(ctx, &placement.order).await.unwrap();
        }
    }

    let discount = h
        .store
        .get_discount(DiscountId::new(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(discount.usage_count, 4);
    assert_eq!(
        h.store.discount_usage_for_order(placement.order.id).await.len(),
        1
    );
}

#[tokio::test]
async fn test_unknown_discount_fails_step_only() {
    let h = TestHarness::new();
    let mut new = new_order("ORD-F2", 1000);
    new.discount_code = Some("NOPE".to_string());

    let placement = h.orchestrator.create_order(new).await.unwrap();

    assert!(matches!(
        outcome(&placement, StepKind::Discount),
        StepResult::Failed(_)
    ));
}

#[tokio::test]
async fn test_coin_store_failure_does_not_fail_order() {
    let h = TestHarness::new();
    let user_id = h.seed_user(4, 0).await;
    h.store.set_fail_coin_writes(true).await;

    let mut new = new_order("ORD-G", 1000);
    new.user_id = Some(user_id);
    let placement = h.orchestrator.create_order(new).await.unwrap();

    assert!(matches!(
        outcome(&placement, StepKind::Cashback),
        StepResult::Failed(_)
    ));
    assert_eq!(h.balance(user_id).await, 0);
}

#[tokio::test]
async fn test_order_write_failure_is_fatal() {
    let h = TestHarness::new();
    h.store.set_fail_order_writes(true).await;

    let err = h
        .orchestrator
        .create_order(new_order("ORD-H", 1000))
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::Persistence(_)));
    assert!(h.carrier.create_calls().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_order_number_conflicts() {
    let h = TestHarness::new();
    h.orchestrator
        .create_order(new_order("ORD-I", 100))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .create_order(new_order("ORD-I", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Conflict(_)));
}

#[tokio::test]
async fn test_total_mismatch_is_rejected() {
    let h = TestHarness::new();
    let mut new = new_order("ORD-J", 100);
    new.total = Money::from_units(90);

    let err = h.orchestrator.create_order(new).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_oversized_quantity_is_rejected_before_persisting() {
    let h = TestHarness::new();
    let mut new = new_order("ORD-J2", 0);
    new.items = vec![
        OrderItem::new("P-1", "Silk Saree", u32::MAX, Money::zero()),
        OrderItem::new("P-2", "Dupatta", 1, Money::zero()),
    ];

    let err = h.orchestrator.create_order(new).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)));
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.carrier.create_calls().await.is_empty());
}

#[tokio::test]
async fn test_overflowing_amounts_are_rejected() {
    let h = TestHarness::new();
    let mut new = new_order("ORD-J3", 100);
    new.shipping_cost = Money::from_cents(i64::MAX);
    new.total = Money::from_cents(i64::MAX);

    let err = h.orchestrator.create_order(new).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_overdraw_coins() {
    let h = Arc::new(TestHarness::new());
    let user_id = h.seed_user(9, 1000).await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..10 {
        let h = Arc::clone(&h);
        tasks.spawn(async move {
            let mut new = new_order(&format!("ORD-CC-{i}"), 100);
            new.user_id = Some(user_id);
            new.coins_used = 300;
            h.orchestrator.create_order(new).await
        });
    }

    let mut debited = 0;
    while let Some(joined) = tasks.join_next().await {
        let placement = joined.unwrap().unwrap();
        if matches!(outcome(&placement, StepKind::CoinDebit), StepResult::Applied(_)) {
            debited += 1;
        }
    }

    // 1000 covers three debits; each order's 50 coin cashback may fund more
    assert!((3..=5).contains(&debited), "debited {debited} times");
    let balance = h.balance(user_id).await;
    assert!(balance >= 0);
    assert_eq!(balance, 1000 - 300 * debited + 10 * 50);

    let reconciliation = h.store.reconcile_coin_balance(user_id).await.unwrap();
    assert_eq!(reconciliation.stored_balance, 1000 + reconciliation.ledger_sum);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_count_shared_discount_once_each() {
    let h = Arc::new(TestHarness::new());
    h.store
        .insert_discount(Discount {
            id: DiscountId::new(8),
            code: "FESTIVE".to_string(),
            is_active: true,
            usage_count: 0,
            expires_at: None,
        })
        .await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..12 {
        let h = Arc::clone(&h);
        tasks.spawn(async move {
            let mut new = new_order(&format!("ORD-CD-{i}"), 500);
            new.discount_code = Some("FESTIVE".to_string());
            new.discount_amount = Money::from_units(50);
            new.total = Money::from_units(450);
            h.orchestrator.create_order(new).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let placement = joined.unwrap().unwrap();
        assert!(matches!(
            outcome(&placement, StepKind::Discount),
            StepResult::Applied(_)
        ));
    }

    let discount = h
        .store
        .get_discount(DiscountId::new(8))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(discount.usage_count, 12);
}

#[tokio::test]
async fn test_cancel_pending_appends_one_history_row_and_cancels_shipment() {
    let h = TestHarness::new();
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-K", 600))
        .await
        .unwrap();
    let order_id = placement.order.id;

    let order = h
        .orchestrator
        .update_order(
            order_id,
            OrderUpdate::status(OrderStatus::Cancelled).with_note("customer request"),
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);

    let history = h.orchestrator.order_history(order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, Some(OrderStatus::Pending));
    assert_eq!(history[0].new_status, OrderStatus::Cancelled);
    assert_eq!(history[0].note.as_deref(), Some("customer request"));

    assert_eq!(h.carrier.cancel_calls().await, vec!["SH-0001".to_string()]);
    let shipment = h.store.get_shipment(order_id).await.unwrap().unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Cancelled);

    let cancellations = h.store.cancellations_for_order(order_id).await;
    assert_eq!(cancellations.len(), 1);
    assert_eq!(cancellations[0].status, CancellationStatus::Approved);
}

#[tokio::test]
async fn test_failed_shipment_cancel_does_not_block_transition() {
    let h = TestHarness::new();
    h.carrier.set_fail_on_cancel(true).await;
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-L", 600))
        .await
        .unwrap();
    let order_id = placement.order.id;

    let order = h
        .orchestrator
        .update_order(order_id, OrderUpdate::status(OrderStatus::Cancelled))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(h.carrier.cancel_calls().await.len(), 1);
    assert_eq!(h.orchestrator.order_history(order_id).await.unwrap().len(), 1);
    let shipment = h.store.get_shipment(order_id).await.unwrap().unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Created);
}

#[tokio::test]
async fn test_cancel_shipment_without_carrier_id_skips_carrier_call() {
    let h = TestHarness::new();
    h.carrier
        .push_create_response(Ok(fulfillment::ShipmentCreated::default()))
        .await;
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-M2", 600))
        .await
        .unwrap();

    let order = h
        .orchestrator
        .update_order(placement.order.id, OrderUpdate::status(OrderStatus::Cancelled))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(h.carrier.cancel_calls().await.is_empty());
    let shipment = h
        .orchestrator
        .order_shipment(placement.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Created);
    assert_eq!(shipment.carrier_shipment_id, None);
}

#[tokio::test]
async fn test_cancel_without_shipment_makes_no_carrier_call() {
    let h = TestHarness::new();
    let mut new = new_order("ORD-M", 600);
    new.cod = false;
    let placement = h.orchestrator.create_order(new).await.unwrap();

    h.orchestrator
        .update_order(placement.order.id, OrderUpdate::status(OrderStatus::Cancelled))
        .await
        .unwrap();

    assert!(h.carrier.cancel_calls().await.is_empty());
}

#[tokio::test]
async fn test_note_only_update_writes_history() {
    let h = TestHarness::new();
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-N", 200))
        .await
        .unwrap();

    h.orchestrator
        .update_order(
            placement.order.id,
            OrderUpdate::default().with_note("called customer"),
        )
        .await
        .unwrap();

    let history = h
        .orchestrator
        .order_history(placement.order.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, Some(OrderStatus::Pending));
    assert_eq!(history[0].new_status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_field_only_update_writes_no_history() {
    let h = TestHarness::new();
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-N2", 200))
        .await
        .unwrap();

    let update = OrderUpdate {
        payment_status: Some(PaymentStatus::Paid),
        ..Default::default()
    };
    let order = h
        .orchestrator
        .update_order(placement.order.id, update)
        .await
        .unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(
        h.orchestrator
            .order_history(placement.order.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_empty_update_is_rejected() {
    let h = TestHarness::new();
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-O", 200))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .update_order(placement.order.id, OrderUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)));
}

#[tokio::test]
async fn test_update_unknown_order_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .orchestrator
        .update_order(
            common::OrderId::new(),
            OrderUpdate::status(OrderStatus::Confirmed),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::NotFound { .. }));
}

#[tokio::test]
async fn test_permissive_policy_allows_skipping_states() {
    let h = TestHarness::new();
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-P", 200))
        .await
        .unwrap();

    let order = h
        .orchestrator
        .update_order(placement.order.id, OrderUpdate::status(OrderStatus::Delivered))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_strict_policy_rejects_skipping_states() {
    let h = TestHarness::with_settings(FulfillmentSettings {
        transition_policy: TransitionPolicy::Strict,
        ..Default::default()
    });
    let placement = h
        .orchestrator
        .create_order(new_order("ORD-Q", 200))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .update_order(placement.order.id, OrderUpdate::status(OrderStatus::Delivered))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Delivered,
        }
    ));
    assert!(
        h.orchestrator
            .order_history(placement.order.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_carrier_timeout_fails_step_only() {
    let h = TestHarness::with_settings(FulfillmentSettings {
        external_timeout: Duration::from_millis(50),
        ..Default::default()
    });
    h.carrier.set_delay(Some(Duration::from_secs(5))).await;

    let placement = h
        .orchestrator
        .create_order(new_order("ORD-R", 300))
        .await
        .unwrap();

    match outcome(&placement, StepKind::Shipment) {
        StepResult::Failed(message) => assert!(message.contains("timed out")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_notifications_are_sent_in_background() {
    let h = TestHarness::new();
    let user_id = h.seed_user(6, 0).await;
    let mut new = new_order("ORD-S", 300);
    new.user_id = Some(user_id);
    let placement = h.orchestrator.create_order(new).await.unwrap();

    h.orchestrator
        .update_order(placement.order.id, OrderUpdate::status(OrderStatus::Shipped))
        .await
        .unwrap();

    let sent = wait_for_notifications(&h.notifier, 6).await;
    assert!(sent.contains(&Notification::ConfirmationEmail {
        order_number: "ORD-S".to_string(),
        is_admin_copy: true,
    }));
    assert!(sent.contains(&Notification::StatusUpdateEmail {
        order_number: "ORD-S".to_string(),
        status: OrderStatus::Shipped,
    }));
}

#[tokio::test]
async fn test_failing_notifier_does_not_fail_order() {
    let h = TestHarness::new();
    h.notifier.set_fail(true).await;

    let placement = h.orchestrator.create_order(new_order("ORD-T", 300)).await;
    assert!(placement.is_ok());
}

#[tokio::test]
async fn test_user_coins_lists_transactions() {
    let h = TestHarness::new();
    let user_id = h.seed_user(8, 10).await;
    let mut new = new_order("ORD-U", 1000);
    new.user_id = Some(user_id);
    h.orchestrator.create_order(new).await.unwrap();

    let coins = h.orchestrator.user_coins(user_id).await.unwrap();
    assert_eq!(coins.user.coin_balance, 510);
    assert_eq!(coins.transactions.len(), 1);

    let err = h
        .orchestrator
        .user_coins(UserId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::NotFound { .. }));
}

#[tokio::test]
async fn test_http_carrier_end_to_end_pickup_retry() {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    type Seen = Arc<tokio::sync::Mutex<Vec<Value>>>;

    async fn create(State(seen): State<Seen>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let mut seen = seen.lock().await;
        seen.push(body["pickup_location"].clone());
        if seen.len() == 1 {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "message": "Wrong Pickup location entered. Please choose one location from data array",
                    "status_code": 422,
                    "data": { "data": [ { "pickup_location": "Warehouse-East" } ] }
                })),
            )
        } else {
            (
                StatusCode::OK,
                Json(json!({
                    "order_id": 9001,
                    "shipment_id": 8001,
                    "status": "NEW",
                    "awb_code": ""
                })),
            )
        }
    }

    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/orders/create/adhoc", post(create))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = HttpCarrierClient::new(
        &format!("http://{addr}"),
        Arc::new(StaticTokenProvider::new("test-token")),
        Duration::from_secs(5),
    )
    .unwrap();
    let h = TestHarness::with_carrier(Arc::new(client));

    let placement = h
        .orchestrator
        .create_order(new_order("ORD-V", 900))
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().await,
        vec![json!("Primary"), json!("Warehouse-East")]
    );
    let shipment = h
        .store
        .get_shipment(placement.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipment.carrier_order_id.as_deref(), Some("9001"));
    assert_eq!(shipment.carrier_shipment_id.as_deref(), Some("8001"));
    assert_eq!(shipment.awb_code, None);
}

async fn wait_for_notifications(notifier: &RecordingNotifier, count: usize) -> Vec<Notification> {
    for _ in 0..100 {
        let sent = notifier.notifications().await;
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    notifier.notifications().await
}
