use common::Money;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use domain::loyalty::{DEFAULT_COMMISSION_RATE_BPS, cashback_coins, coins_for, commission_for};
use domain::{Address, NewOrder, Order, OrderItem, OrderStatus, OrderUpdate};

fn sample_order(item_count: usize) -> NewOrder {
    let address = Address {
        line1: "12 MG Road".to_string(),
        city: "Pune".to_string(),
        postal_code: "411001".to_string(),
        ..Default::default()
    };
    let items = (0..item_count)
        .map(|i| OrderItem::new(format!("P-{i}"), "Bench Item", 2, Money::from_cents(49_900)))
        .collect();
    NewOrder::new("ORD-BENCH", "Bench Buyer", "bench@example.com", address, items)
}

fn bench_validate(c: &mut Criterion) {
    let order = sample_order(25);

    c.bench_function("domain/validate_new_order", |b| {
        b.iter(|| black_box(&order).validate().unwrap());
    });
}

fn bench_loyalty(c: &mut Criterion) {
    c.bench_function("domain/cashback_and_commission", |b| {
        b.iter(|| {
            let total = black_box(Money::from_cents(1_234_567));
            let commission = commission_for(total, DEFAULT_COMMISSION_RATE_BPS);
            black_box(cashback_coins(total) + coins_for(commission))
        });
    });
}

fn bench_apply_update(c: &mut Criterion) {
    let placed = Order::place(
        common::OrderId::new(),
        sample_order(5),
        chrono::Utc::now(),
    );
    let update = OrderUpdate::status(OrderStatus::Shipped);

    c.bench_function("domain/apply_status_update", |b| {
        b.iter(|| {
            let mut order = placed.clone();
            black_box(order.apply_update(&update, chrono::Utc::now()))
        });
    });
}

criterion_group!(benches, bench_validate, bench_loyalty, bench_apply_update);
criterion_main!(benches);
