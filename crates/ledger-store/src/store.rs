use async_trait::async_trait;
use common::{AffiliateId, DiscountId, OrderId, UserId};
use domain::{
    Affiliate, AffiliateReferral, CancellationStatus, CoinTransaction, Discount, DiscountUsage,
    NewCoinTransaction, NewDiscountUsage, NewHistoryEntry, NewReferral, Order, OrderCancellation,
    OrderStatusHistory, Shipment, User,
};

use crate::{OrderQuery, Result};

/// Outcome of a keyed ledger insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded<T> {
    /// The row was written and its side effects (counters, balance) applied.
    Inserted(T),
    /// A row with the same uniqueness key already existed; nothing changed.
    AlreadyExists(T),
}

impl<T> Recorded<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Recorded::Inserted(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Recorded::Inserted(value) | Recorded::AlreadyExists(value) => value,
        }
    }
}

/// Stored balance against the sum of a user's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinReconciliation {
    pub user_id: UserId,
    pub stored_balance: i64,
    pub ledger_sum: i64,
}

impl CoinReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.ledger_sum
    }
}

/// Core trait for ledger store implementations.
///
/// Each method is one logical step: compound writes (row insert plus counter
/// or balance adjustment) are atomic within a single call. Nothing spans
/// calls, so the orchestrator owns cross-row consistency.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a new order row. Fails with `Conflict` on a duplicate order number.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Overwrites the mutable columns of an existing order.
    async fn update_order(&self, order: &Order) -> Result<()>;

    /// Appends one status-history row. History rows are never updated or deleted.
    async fn append_history(&self, entry: NewHistoryEntry) -> Result<OrderStatusHistory>;

    /// Returns an order's history, oldest first.
    async fn history_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>>;

    /// Looks up a discount by its (case-insensitive) code.
    async fn find_discount_by_code(&self, code: &str) -> Result<Option<Discount>>;

    async fn get_discount(&self, discount_id: DiscountId) -> Result<Option<Discount>>;

    /// Records a discount use and increments the discount's usage count by one.
    ///
    /// Keyed on `(discount_id, order_id)`: a repeat returns `AlreadyExists`
    /// and leaves the usage count untouched.
    async fn record_discount_usage(
        &self,
        usage: NewDiscountUsage,
    ) -> Result<Recorded<DiscountUsage>>;

    async fn get_affiliate(&self, affiliate_id: AffiliateId) -> Result<Option<Affiliate>>;

    /// Records a confirmed referral and adds it to the affiliate's totals.
    ///
    /// Keyed on `(affiliate_id, order_id)`.
    async fn record_referral(&self, referral: NewReferral) -> Result<Recorded<AffiliateReferral>>;

    async fn referrals_for_order(&self, order_id: OrderId) -> Result<Vec<AffiliateReferral>>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Writes a coin transaction and adjusts the user's balance by its amount.
    ///
    /// Both happen or neither does. A debit that would take the balance below
    /// zero fails with `InsufficientBalance`; a repeated idempotency key
    /// returns `AlreadyExists` without touching the balance.
    async fn apply_coin_delta(
        &self,
        transaction: NewCoinTransaction,
    ) -> Result<Recorded<CoinTransaction>>;

    /// Returns a user's coin transactions, oldest first.
    async fn coin_transactions_for_user(&self, user_id: UserId) -> Result<Vec<CoinTransaction>>;

    async fn get_shipment(&self, order_id: OrderId) -> Result<Option<Shipment>>;

    /// Inserts the order's shipment row, or updates it in place if one exists.
    async fn upsert_shipment(&self, shipment: &Shipment) -> Result<Shipment>;

    /// Returns a pending or approved cancellation for the order, if any.
    async fn open_cancellation(&self, order_id: OrderId) -> Result<Option<OrderCancellation>>;

    /// Records a cancellation unless an open one already exists for the order.
    async fn record_cancellation(
        &self,
        order_id: OrderId,
        status: CancellationStatus,
        reason: Option<String>,
    ) -> Result<Recorded<OrderCancellation>>;
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Loads an order, failing with `NotFound` if it does not exist.
    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| crate::LedgerError::not_found("Order", order_id))
    }

    /// Compares the stored balance with the sum of the user's transactions.
    async fn reconcile_coin_balance(&self, user_id: UserId) -> Result<CoinReconciliation> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| crate::LedgerError::not_found("User", user_id))?;
        let ledger_sum = self
            .coin_transactions_for_user(user_id)
            .await?
            .iter()
            .map(|tx| tx.amount)
            .sum();

        Ok(CoinReconciliation {
            user_id,
            stored_balance: user.coin_balance,
            ledger_sum,
        })
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}
