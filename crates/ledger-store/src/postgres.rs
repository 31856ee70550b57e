use std::collections::BTreeSet;

use async_trait::async_trait;
use common::{AffiliateId, DiscountId, Money, OrderId, UserId};
use domain::{
    Address, Affiliate, AffiliateReferral, CancellationStatus, CoinTransaction, Discount,
    DiscountUsage, NewCoinTransaction, NewDiscountUsage, NewHistoryEntry, NewReferral, Order,
    OrderCancellation, OrderItem, OrderStatus, OrderStatusHistory, Shipment, User,
};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::{
    CommissionSettings, LedgerError, OrderQuery, Result,
    store::{LedgerStore, Recorded},
};

const ORDER_COLUMNS: &str = r#"
    id, order_number, user_id, customer_name, customer_email, customer_phone,
    shipping_address, billing_address, items, subtotal_cents, shipping_cost_cents,
    tax_cents, total_cents, discount_code, discount_amount_cents, coins_used,
    affiliate_id, payment_method, payment_status, cod, status, tags, tracking_url,
    created_at, updated_at
"#;

const COIN_COLUMNS: &str = r#"
    id, user_id, amount, kind, status, order_id, idempotency_key, description,
    metadata, created_at
"#;

const SHIPMENT_COLUMNS: &str = r#"
    order_id, carrier_order_id, carrier_shipment_id, status, awb_code, tracking_url,
    label_url, pickup_location, created_at, updated_at
"#;

/// PostgreSQL-backed ledger store implementation.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let tags: Vec<String> = row.try_get("tags")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            shipping_address: row.try_get::<Json<Address>, _>("shipping_address")?.0,
            billing_address: row
                .try_get::<Option<Json<Address>>, _>("billing_address")?
                .map(|json| json.0),
            items: row.try_get::<Json<Vec<OrderItem>>, _>("items")?.0,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            discount_code: row.try_get("discount_code")?,
            discount_amount: Money::from_cents(row.try_get("discount_amount_cents")?),
            coins_used: row.try_get("coins_used")?,
            affiliate_id: row
                .try_get::<Option<i64>, _>("affiliate_id")?
                .map(AffiliateId::new),
            payment_method: row.try_get("payment_method")?,
            payment_status: payment_status.parse()?,
            cod: row.try_get("cod")?,
            status: status.parse()?,
            tags: tags.into_iter().collect::<BTreeSet<_>>(),
            tracking_url: row.try_get("tracking_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_history(row: PgRow) -> Result<OrderStatusHistory> {
        let old_status: Option<String> = row.try_get("old_status")?;
        let new_status: String = row.try_get("new_status")?;

        Ok(OrderStatusHistory {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            old_status: old_status
                .map(|s| s.parse::<OrderStatus>())
                .transpose()?,
            new_status: new_status.parse()?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_discount(row: PgRow) -> Result<Discount> {
        Ok(Discount {
            id: DiscountId::new(row.try_get("id")?),
            code: row.try_get("code")?,
            is_active: row.try_get("is_active")?,
            usage_count: row.try_get("usage_count")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn row_to_usage(row: PgRow) -> Result<DiscountUsage> {
        Ok(DiscountUsage {
            id: row.try_get("id")?,
            discount_id: DiscountId::new(row.try_get("discount_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            customer_email: row.try_get("customer_email")?,
            discount_amount: Money::from_cents(row.try_get("discount_amount_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_affiliate(row: PgRow) -> Result<Affiliate> {
        let status: String = row.try_get("status")?;

        Ok(Affiliate {
            id: AffiliateId::new(row.try_get("id")?),
            user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            status: status.parse()?,
            total_referrals: row.try_get("total_referrals")?,
            total_earnings: Money::from_cents(row.try_get("total_earnings_cents")?),
            pending_earnings: Money::from_cents(row.try_get("pending_earnings_cents")?),
        })
    }

    fn row_to_referral(row: PgRow) -> Result<AffiliateReferral> {
        let status: String = row.try_get("status")?;
        let rate: i32 = row.try_get("commission_rate_bps")?;

        Ok(AffiliateReferral {
            id: row.try_get("id")?,
            affiliate_id: AffiliateId::new(row.try_get("affiliate_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            commission_rate_bps: u32::try_from(rate)
                .map_err(|_| LedgerError::Corrupt(format!("negative commission rate {rate}")))?,
            commission_earned: Money::from_cents(row.try_get("commission_earned_cents")?),
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_coin_transaction(row: PgRow) -> Result<CoinTransaction> {
        let kind: String = row.try_get("kind")?;

        Ok(CoinTransaction {
            id: row.try_get("id")?,
            user_id: UserId::new(row.try_get("user_id")?),
            amount: row.try_get("amount")?,
            kind: kind.parse()?,
            status: row.try_get("status")?,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            idempotency_key: row.try_get("idempotency_key")?,
            description: row.try_get("description")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_shipment(row: PgRow) -> Result<Shipment> {
        let status: String = row.try_get("status")?;

        Ok(Shipment {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            carrier_order_id: row.try_get("carrier_order_id")?,
            carrier_shipment_id: row.try_get("carrier_shipment_id")?,
            status: status.parse()?,
            awb_code: row.try_get("awb_code")?,
            tracking_url: row.try_get("tracking_url")?,
            label_url: row.try_get("label_url")?,
            pickup_location: row.try_get("pickup_location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cancellation(row: PgRow) -> Result<OrderCancellation> {
        let status: String = row.try_get("status")?;

        Ok(OrderCancellation {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            status: status.parse()?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let tags: Vec<String> = order.tags.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, user_id, customer_name, customer_email, customer_phone,
                shipping_address, billing_address, items, subtotal_cents, shipping_cost_cents,
                tax_cents, total_cents, discount_code, discount_amount_cents, coins_used,
                affiliate_id, payment_method, payment_status, cod, status, tags, tracking_url,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.map(|id| id.get()))
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(Json(&order.shipping_address))
        .bind(order.billing_address.as_ref().map(Json))
        .bind(Json(&order.items))
        .bind(order.subtotal.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.tax.cents())
        .bind(order.total.cents())
        .bind(&order.discount_code)
        .bind(order.discount_amount.cents())
        .bind(order.coins_used)
        .bind(order.affiliate_id.map(|id| id.get()))
        .bind(&order.payment_method)
        .bind(order.payment_status.as_str())
        .bind(order.cod)
        .bind(order.status.as_str())
        .bind(tags)
        .bind(&order.tracking_url)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && matches!(db_err.constraint(), Some("unique_order_number" | "orders_pkey"))
            {
                return LedgerError::Conflict(format!(
                    "order number {} already exists",
                    order.order_number
                ));
            }
            LedgerError::Database(e)
        })?;

        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, order_number DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let tags: Vec<String> = order.tags.iter().cloned().collect();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, tags = $4, tracking_url = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(tags)
        .bind(&order.tracking_url)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Order", order.id));
        }
        Ok(())
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<OrderStatusHistory> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, old_status, new_status, note)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, old_status, new_status, note, created_at
            "#,
        )
        .bind(entry.order_id.as_uuid())
        .bind(entry.old_status.map(|s| s.as_str()))
        .bind(entry.new_status.as_str())
        .bind(&entry.note)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return LedgerError::not_found("Order", entry.order_id);
            }
            LedgerError::Database(e)
        })?;

        Self::row_to_history(row)
    }

    async fn history_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, old_status, new_status, note, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_history).collect()
    }

    async fn find_discount_by_code(&self, code: &str) -> Result<Option<Discount>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, is_active, usage_count, expires_at
            FROM discounts
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_discount).transpose()
    }

    async fn get_discount(&self, discount_id: DiscountId) -> Result<Option<Discount>> {
        let row = sqlx::query(
            "SELECT id, code, is_active, usage_count, expires_at FROM discounts WHERE id = $1",
        )
        .bind(discount_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_discount).transpose()
    }

    async fn record_discount_usage(
        &self,
        usage: NewDiscountUsage,
    ) -> Result<Recorded<DiscountUsage>> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO discount_usage (discount_id, order_id, customer_email, discount_amount_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT unique_discount_order DO NOTHING
            RETURNING id, discount_id, order_id, customer_email, discount_amount_cents, created_at
            "#,
        )
        .bind(usage.discount_id.get())
        .bind(usage.order_id.as_uuid())
        .bind(&usage.customer_email)
        .bind(usage.discount_amount.cents())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return LedgerError::not_found("Discount", usage.discount_id);
            }
            LedgerError::Database(e)
        })?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            let existing = sqlx::query(
                r#"
                SELECT id, discount_id, order_id, customer_email, discount_amount_cents, created_at
                FROM discount_usage
                WHERE discount_id = $1 AND order_id = $2
                "#,
            )
            .bind(usage.discount_id.get())
            .bind(usage.order_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            return Ok(Recorded::AlreadyExists(Self::row_to_usage(existing)?));
        };

        sqlx::query("UPDATE discounts SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(usage.discount_id.get())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Recorded::Inserted(Self::row_to_usage(row)?))
    }

    async fn get_affiliate(&self, affiliate_id: AffiliateId) -> Result<Option<Affiliate>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_referrals, total_earnings_cents, pending_earnings_cents
            FROM affiliates
            WHERE id = $1
            "#,
        )
        .bind(affiliate_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_affiliate).transpose()
    }

    async fn record_referral(&self, referral: NewReferral) -> Result<Recorded<AffiliateReferral>> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO affiliate_referrals
                (affiliate_id, order_id, commission_rate_bps, commission_earned_cents, status)
            VALUES ($1, $2, $3, $4, 'confirmed')
            ON CONFLICT ON CONSTRAINT unique_affiliate_order DO NOTHING
            RETURNING id, affiliate_id, order_id, commission_rate_bps, commission_earned_cents,
                      status, created_at
            "#,
        )
        .bind(referral.affiliate_id.get())
        .bind(referral.order_id.as_uuid())
        .bind(referral.commission_rate_bps as i32)
        .bind(referral.commission_earned.cents())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return LedgerError::not_found("Affiliate", referral.affiliate_id);
            }
            LedgerError::Database(e)
        })?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            let existing = sqlx::query(
                r#"
                SELECT id, affiliate_id, order_id, commission_rate_bps, commission_earned_cents,
                       status, created_at
                FROM affiliate_referrals
                WHERE affiliate_id = $1 AND order_id = $2
                "#,
            )
            .bind(referral.affiliate_id.get())
            .bind(referral.order_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            return Ok(Recorded::AlreadyExists(Self::row_to_referral(existing)?));
        };

        sqlx::query(
            r#"
            UPDATE affiliates
            SET total_referrals = total_referrals + 1,
                total_earnings_cents = total_earnings_cents + $2,
                pending_earnings_cents = pending_earnings_cents + $2
            WHERE id = $1
            "#,
        )
        .bind(referral.affiliate_id.get())
        .bind(referral.commission_earned.cents())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Recorded::Inserted(Self::row_to_referral(row)?))
    }

    async fn referrals_for_order(&self, order_id: OrderId) -> Result<Vec<AffiliateReferral>> {
        let rows = sqlx::query(
            r#"
            SELECT id, affiliate_id, order_id, commission_rate_bps, commission_earned_cents,
                   status, created_at
            FROM affiliate_referrals
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_referral).collect()
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, coin_balance FROM users WHERE id = $1")
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(User {
                id: UserId::new(row.try_get("id")?),
                email: row.try_get("email")?,
                coin_balance: row.try_get("coin_balance")?,
            })),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, transaction), fields(user_id = %transaction.user_id, amount = transaction.amount))]
    async fn apply_coin_delta(
        &self,
        transaction: NewCoinTransaction,
    ) -> Result<Recorded<CoinTransaction>> {
        let mut tx = self.pool.begin().await?;

        // Lock the balance row so the check and the adjustment see the same value
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT coin_balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(transaction.user_id.get())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(balance) = balance else {
            return Err(LedgerError::not_found("User", transaction.user_id));
        };

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO coin_transactions
                (user_id, amount, kind, status, order_id, idempotency_key, description, metadata)
            VALUES ($1, $2, $3, 'completed', $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT unique_coin_idempotency_key DO NOTHING
            RETURNING {COIN_COLUMNS}
            "#
        ))
        .bind(transaction.user_id.get())
        .bind(transaction.amount)
        .bind(transaction.kind.as_str())
        .bind(transaction.order_id.map(|id| id.as_uuid()))
        .bind(&transaction.idempotency_key)
        .bind(&transaction.description)
        .bind(&transaction.metadata)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            let existing = sqlx::query(&format!(
                "SELECT {COIN_COLUMNS} FROM coin_transactions WHERE idempotency_key = $1"
            ))
            .bind(&transaction.idempotency_key)
            .fetch_one(&self.pool)
            .await?;
            tracing::debug!("coin transaction already recorded");
            return Ok(Recorded::AlreadyExists(Self::row_to_coin_transaction(
                existing,
            )?));
        };

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET coin_balance = coin_balance + $2
            WHERE id = $1 AND coin_balance + $2 >= 0
            "#,
        )
        .bind(transaction.user_id.get())
        .bind(transaction.amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            metrics::counter!("ledger_insufficient_balance_total").increment(1);
            return Err(LedgerError::InsufficientBalance {
                user_id: transaction.user_id,
                balance,
                requested: -transaction.amount,
            });
        }

        tx.commit().await?;
        Ok(Recorded::Inserted(Self::row_to_coin_transaction(row)?))
    }

    async fn coin_transactions_for_user(&self, user_id: UserId) -> Result<Vec<CoinTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {COIN_COLUMNS} FROM coin_transactions WHERE user_id = $1 ORDER BY id ASC"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_coin_transaction).collect()
    }

    async fn get_shipment(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        let row = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shiprocket_shipments WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_shipment).transpose()
    }

    async fn upsert_shipment(&self, shipment: &Shipment) -> Result<Shipment> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO shiprocket_shipments ({SHIPMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (order_id) DO UPDATE SET
                carrier_order_id = EXCLUDED.carrier_order_id,
                carrier_shipment_id = EXCLUDED.carrier_shipment_id,
                status = EXCLUDED.status,
                awb_code = EXCLUDED.awb_code,
                tracking_url = EXCLUDED.tracking_url,
                label_url = EXCLUDED.label_url,
                pickup_location = EXCLUDED.pickup_location,
                updated_at = EXCLUDED.updated_at
            RETURNING {SHIPMENT_COLUMNS}
            "#
        ))
        .bind(shipment.order_id.as_uuid())
        .bind(&shipment.carrier_order_id)
        .bind(&shipment.carrier_shipment_id)
        .bind(shipment.status.as_str())
        .bind(&shipment.awb_code)
        .bind(&shipment.tracking_url)
        .bind(&shipment.label_url)
        .bind(&shipment.pickup_location)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_shipment(row)
    }

    async fn open_cancellation(&self, order_id: OrderId) -> Result<Option<OrderCancellation>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, reason, created_at
            FROM order_cancellations
            WHERE order_id = $1 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cancellation).transpose()
    }

    async fn record_cancellation(
        &self,
        order_id: OrderId,
        status: CancellationStatus,
        reason: Option<String>,
    ) -> Result<Recorded<OrderCancellation>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO order_cancellations (order_id, status, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id) WHERE status IN ('pending', 'approved') DO NOTHING
            RETURNING id, order_id, status, reason, created_at
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(status.as_str())
        .bind(&reason)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(Recorded::Inserted(Self::row_to_cancellation(row)?)),
            None => {
                let existing = self
                    .open_cancellation(order_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("OrderCancellation", order_id))?;
                Ok(Recorded::AlreadyExists(existing))
            }
        }
    }
}

#[async_trait]
impl CommissionSettings for PostgresLedgerStore {
    async fn active_rate_bps(&self) -> Result<Option<u32>> {
        let rate: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT commission_rate_bps
            FROM commission_settings
            WHERE is_active
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        rate.map(|bps| {
            u32::try_from(bps)
                .map_err(|_| LedgerError::Corrupt(format!("negative commission rate {bps}")))
        })
        .transpose()
    }
}
