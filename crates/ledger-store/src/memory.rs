use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AffiliateId, DiscountId, OrderId, UserId};
use domain::{
    Affiliate, AffiliateReferral, CancellationStatus, CoinTransaction, Discount, DiscountUsage,
    NewCoinTransaction, NewDiscountUsage, NewHistoryEntry, NewReferral, Order, OrderCancellation,
    OrderStatusHistory, ReferralStatus, Shipment, User,
};
use tokio::sync::RwLock;

use crate::{
    CommissionSettings, LedgerError, OrderQuery, Result,
    store::{LedgerStore, Recorded},
};

#[derive(Debug, Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    history: Vec<OrderStatusHistory>,
    discounts: HashMap<DiscountId, Discount>,
    discount_usage: Vec<DiscountUsage>,
    affiliates: HashMap<AffiliateId, Affiliate>,
    referrals: Vec<AffiliateReferral>,
    users: HashMap<UserId, User>,
    coin_transactions: Vec<CoinTransaction>,
    shipments: HashMap<OrderId, Shipment>,
    cancellations: Vec<OrderCancellation>,
    commission_rate_bps: Option<u32>,
    next_id: i64,
    fail_order_writes: bool,
    fail_coin_writes: bool,
}

impl LedgerState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory ledger store for tests and local runs without a database.
///
/// Every trait method takes the single write lock for its whole body, which
/// gives the same per-call atomicity as the PostgreSQL transactions.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds (or replaces) a user account.
    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Seeds (or replaces) a discount definition.
    pub async fn insert_discount(&self, discount: Discount) {
        self.state
            .write()
            .await
            .discounts
            .insert(discount.id, discount);
    }

    /// Seeds (or replaces) an affiliate.
    pub async fn insert_affiliate(&self, affiliate: Affiliate) {
        self.state
            .write()
            .await
            .affiliates
            .insert(affiliate.id, affiliate);
    }

    /// Sets the active commission rate; `None` means no active setting.
    pub async fn set_commission_rate(&self, rate_bps: Option<u32>) {
        self.state.write().await.commission_rate_bps = rate_bps;
    }

    /// Makes order inserts and updates fail with `Unavailable`.
    pub async fn set_fail_order_writes(&self, fail: bool) {
        self.state.write().await.fail_order_writes = fail;
    }

    /// Makes coin transactions fail with `Unavailable`.
    pub async fn set_fail_coin_writes(&self, fail: bool) {
        self.state.write().await.fail_coin_writes = fail;
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn discount_usage_for_order(&self, order_id: OrderId) -> Vec<DiscountUsage> {
        self.state
            .read()
            .await
            .discount_usage
            .iter()
            .filter(|usage| usage.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn cancellations_for_order(&self, order_id: OrderId) -> Vec<OrderCancellation> {
        self.state
            .read()
            .await
            .cancellations
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_order_writes {
            return Err(LedgerError::Unavailable("order writes disabled".to_string()));
        }
        if state
            .orders
            .values()
            .any(|existing| existing.order_number == order.order_number)
        {
            return Err(LedgerError::Conflict(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        if state.orders.contains_key(&order.id) {
            return Err(LedgerError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }

        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| query.matches(order.status))
            .cloned()
            .collect();

        // Newest first, order number as a stable tiebreak
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_order_writes {
            return Err(LedgerError::Unavailable("order writes disabled".to_string()));
        }

        match state.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(LedgerError::not_found("Order", order.id)),
        }
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<OrderStatusHistory> {
        let mut state = self.state.write().await;

        if !state.orders.contains_key(&entry.order_id) {
            return Err(LedgerError::not_found("Order", entry.order_id));
        }

        let row = OrderStatusHistory {
            id: state.next_id(),
            order_id: entry.order_id,
            old_status: entry.old_status,
            new_status: entry.new_status,
            note: entry.note,
            created_at: Utc::now(),
        };
        state.history.push(row.clone());
        Ok(row)
    }

    async fn history_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|row| row.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_discount_by_code(&self, code: &str) -> Result<Option<Discount>> {
        let state = self.state.read().await;
        Ok(state
            .discounts
            .values()
            .find(|discount| discount.code.eq_ignore_ascii_case(code.trim()))
            .cloned())
    }

    async fn get_discount(&self, discount_id: DiscountId) -> Result<Option<Discount>> {
        Ok(self.state.read().await.discounts.get(&discount_id).cloned())
    }

    async fn record_discount_usage(
        &self,
        usage: NewDiscountUsage,
    ) -> Result<Recorded<DiscountUsage>> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .discount_usage
            .iter()
            .find(|u| u.discount_id == usage.discount_id && u.order_id == usage.order_id)
        {
            return Ok(Recorded::AlreadyExists(existing.clone()));
        }

        let id = state.next_id();
        let discount = state
            .discounts
            .get_mut(&usage.discount_id)
            .ok_or_else(|| LedgerError::not_found("Discount", usage.discount_id))?;
        discount.usage_count += 1;

        let row = DiscountUsage {
            id,
            discount_id: usage.discount_id,
            order_id: usage.order_id,
            customer_email: usage.customer_email,
            discount_amount: usage.discount_amount,
            created_at: Utc::now(),
        };
        state.discount_usage.push(row.clone());
        Ok(Recorded::Inserted(row))
    }

    async fn get_affiliate(&self, affiliate_id: AffiliateId) -> Result<Option<Affiliate>> {
        Ok(self.state.read().await.affiliates.get(&affiliate_id).cloned())
    }

    async fn record_referral(&self, referral: NewReferral) -> Result<Recorded<AffiliateReferral>> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .referrals
            .iter()
            .find(|r| r.affiliate_id == referral.affiliate_id && r.order_id == referral.order_id)
        {
            return Ok(Recorded::AlreadyExists(existing.clone()));
        }

        let id = state.next_id();
        let affiliate = state
            .affiliates
            .get_mut(&referral.affiliate_id)
            .ok_or_else(|| LedgerError::not_found("Affiliate", referral.affiliate_id))?;
        affiliate.total_referrals += 1;
        affiliate.total_earnings += referral.commission_earned;
        affiliate.pending_earnings += referral.commission_earned;

        let row = AffiliateReferral {
            id,
            affiliate_id: referral.affiliate_id,
            order_id: referral.order_id,
            commission_rate_bps: referral.commission_rate_bps,
            commission_earned: referral.commission_earned,
            status: ReferralStatus::Confirmed,
            created_at: Utc::now(),
        };
        state.referrals.push(row.clone());
        Ok(Recorded::Inserted(row))
    }

    async fn referrals_for_order(&self, order_id: OrderId) -> Result<Vec<AffiliateReferral>> {
        let state = self.state.read().await;
        Ok(state
            .referrals
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn apply_coin_delta(
        &self,
        transaction: NewCoinTransaction,
    ) -> Result<Recorded<CoinTransaction>> {
        let mut state = self.state.write().await;

        if state.fail_coin_writes {
            return Err(LedgerError::Unavailable("coin writes disabled".to_string()));
        }

        if let Some(key) = transaction.idempotency_key.as_deref()
            && let Some(existing) = state
                .coin_transactions
                .iter()
                .find(|tx| tx.idempotency_key.as_deref() == Some(key))
        {
            return Ok(Recorded::AlreadyExists(existing.clone()));
        }

        let id = state.next_id();
        let user = state
            .users
            .get_mut(&transaction.user_id)
            .ok_or_else(|| LedgerError::not_found("User", transaction.user_id))?;

        let new_balance = user.coin_balance.saturating_add(transaction.amount);
        if new_balance < 0 {
            return Err(LedgerError::InsufficientBalance {
                user_id: user.id,
                balance: user.coin_balance,
                requested: -transaction.amount,
            });
        }
        user.coin_balance = new_balance;

        let row = CoinTransaction {
            id,
            user_id: transaction.user_id,
            amount: transaction.amount,
            kind: transaction.kind,
            status: "completed".to_string(),
            order_id: transaction.order_id,
            idempotency_key: transaction.idempotency_key,
            description: transaction.description,
            metadata: transaction.metadata,
            created_at: Utc::now(),
        };
        state.coin_transactions.push(row.clone());
        Ok(Recorded::Inserted(row))
    }

    async fn coin_transactions_for_user(&self, user_id: UserId) -> Result<Vec<CoinTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .coin_transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_shipment(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        Ok(self.state.read().await.shipments.get(&order_id).cloned())
    }

    async fn upsert_shipment(&self, shipment: &Shipment) -> Result<Shipment> {
        let mut state = self.state.write().await;

        let stored = match state.shipments.get(&shipment.order_id) {
            Some(existing) => Shipment {
                created_at: existing.created_at,
                ..shipment.clone()
            },
            None => shipment.clone(),
        };
        state.shipments.insert(stored.order_id, stored.clone());
        Ok(stored)
    }

    async fn open_cancellation(&self, order_id: OrderId) -> Result<Option<OrderCancellation>> {
        let state = self.state.read().await;
        Ok(state
            .cancellations
            .iter()
            .find(|c| c.order_id == order_id && c.status.is_open())
            .cloned())
    }

    async fn record_cancellation(
        &self,
        order_id: OrderId,
        status: CancellationStatus,
        reason: Option<String>,
    ) -> Result<Recorded<OrderCancellation>> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .cancellations
            .iter()
            .find(|c| c.order_id == order_id && c.status.is_open())
        {
            return Ok(Recorded::AlreadyExists(existing.clone()));
        }

        let row = OrderCancellation {
            id: state.next_id(),
            order_id,
            status,
            reason,
            created_at: Utc::now(),
        };
        state.cancellations.push(row.clone());
        Ok(Recorded::Inserted(row))
    }
}

#[async_trait]
impl CommissionSettings for InMemoryLedgerStore {
    async fn active_rate_bps(&self) -> Result<Option<u32>> {
        Ok(self.state.read().await.commission_rate_bps)
    }
}
