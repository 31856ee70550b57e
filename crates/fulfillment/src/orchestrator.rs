//! Order orchestrator: order creation with its side effects, and status updates.

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, UserId};
use domain::{
    CancellationStatus, CoinTransaction, NewHistoryEntry, NewOrder, Order, OrderStatus,
    OrderStatusHistory, OrderUpdate, Shipment, User,
};
use ledger_store::{LedgerStoreExt, OrderQuery};
use serde::Serialize;

use crate::carrier::ServiceabilityQuery;
use crate::context::FulfillmentContext;
use crate::error::{FulfillmentError, Result};
use crate::steps::{ShipmentProvisioner, Step, StepOutcome, StepResult, default_steps};

/// A stored order and what each side-effect step did for it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPlacement {
    pub order: Order,
    pub outcomes: Vec<StepOutcome>,
}

impl OrderPlacement {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_failed())
    }
}

/// A user's coin balance with the transactions behind it.
#[derive(Debug, Clone, Serialize)]
pub struct UserCoins {
    pub user: User,
    pub transactions: Vec<CoinTransaction>,
}

/// Runs order creation and status transitions against a [`FulfillmentContext`].
///
/// Only the order row is written strictly. Every other side effect is a
/// [`Step`] whose failure is logged and reported in the outcome list.
pub struct OrderOrchestrator {
    ctx: Arc<FulfillmentContext>,
    steps: Vec<Box<dyn Step>>,
}

impl OrderOrchestrator {
    /// Creates an orchestrator running the default step sequence.
    pub fn new(ctx: Arc<FulfillmentContext>) -> Self {
        Self::with_steps(ctx, default_steps())
    }

    pub fn with_steps(ctx: Arc<FulfillmentContext>, steps: Vec<Box<dyn Step>>) -> Self {
        Self { ctx, steps }
    }

    pub fn context(&self) -> &FulfillmentContext {
        &self.ctx
    }

    /// Validates and stores a new order, then runs each step once in order.
    #[tracing::instrument(skip(self, new), fields(order_number = %new.order_number))]
    pub async fn create_order(&self, new: NewOrder) -> Result<OrderPlacement> {
        let started = Instant::now();
        new.validate()?;

        let order = Order::place(OrderId::new(), new, self.ctx.now());
        if let Err(e) = self.ctx.store().insert_order(&order).await {
            tracing::error!(order_id = %order.id, error = %e, "failed to store order");
            return Err(e.into());
        }

        let outcomes = self.run_steps(&order).await;

        self.ctx.notifier().order_placed(&order);

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            failed_steps = outcomes.iter().filter(|o| o.is_failed()).count(),
            "order created"
        );

        Ok(OrderPlacement { order, outcomes })
    }

    async fn run_steps(&self, order: &Order) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let kind = step.kind();
            let result = match step.apply(&self.ctx, order).await {
                Ok(fact) => StepResult::Applied(fact),
                Err(e) => {
                    metrics::counter!("fulfillment_step_failures_total", "step" => kind.as_str())
                        .increment(1);
                    tracing::warn!(
                        order_id = %order.id,
                        step = %kind,
                        error = %e,
                        "fulfillment step failed"
                    );
                    // TODO: record failed steps in a retry table so a reconciliation
                    // job can re-run them; all steps are keyed and safe to repeat.
                    StepResult::Failed(e.to_string())
                }
            };
            outcomes.push(StepOutcome { step: kind, result });
        }

        outcomes
    }

    /// Applies a status change, note and/or field update to an order.
    ///
    /// Cancelling first cancels the carrier shipment and records an approved
    /// cancellation; neither failure blocks the transition. One history row is
    /// appended per request when the status changes or a note is given.
    #[tracing::instrument(skip(self, update), fields(to = ?update.status))]
    pub async fn update_order(&self, order_id: OrderId, update: OrderUpdate) -> Result<Order> {
        if update.is_empty() {
            return Err(FulfillmentError::Validation(
                "update must contain a status, a note or at least one field".to_string(),
            ));
        }

        let mut order = self.ctx.store().require_order(order_id).await?;
        let old_status = order.status;
        let new_status = update.status.unwrap_or(old_status);
        self.ctx
            .settings()
            .transition_policy
            .check(old_status, new_status)?;

        let cancelling = new_status == OrderStatus::Cancelled && old_status != new_status;
        if cancelling {
            self.cancel_side_effects(order_id).await;
        }

        if order.apply_update(&update, self.ctx.now()) {
            self.ctx.store().update_order(&order).await?;
        }

        let note = update.note().map(str::to_string);
        if old_status != new_status || note.is_some() {
            self.ctx
                .store()
                .append_history(NewHistoryEntry {
                    order_id,
                    old_status: Some(old_status),
                    new_status,
                    note,
                })
                .await?;
        }

        if old_status != new_status {
            metrics::counter!("order_status_transitions_total", "to" => new_status.as_str())
                .increment(1);
            tracing::info!(%order_id, from = %old_status, to = %new_status, "order status changed");

            if cancelling {
                self.ctx.notifier().order_cancelled(&order);
            } else {
                self.ctx.notifier().status_changed(&order);
            }
        }

        Ok(order)
    }

    async fn cancel_side_effects(&self, order_id: OrderId) {
        match ShipmentProvisioner.cancel(&self.ctx, order_id).await {
            Ok(true) => tracing::info!(%order_id, "carrier shipment cancelled"),
            Ok(false) => tracing::debug!(%order_id, "no active shipment to cancel"),
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "shipment cancellation failed");
            }
        }

        if let Err(e) = self
            .ctx
            .store()
            .record_cancellation(order_id, CancellationStatus::Approved, None)
            .await
        {
            tracing::warn!(%order_id, error = %e, "failed to record order cancellation");
        }
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.ctx.store().require_order(order_id).await?)
    }

    pub async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        Ok(self.ctx.store().list_orders(query).await?)
    }

    /// Returns the order's status history, oldest first.
    pub async fn order_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        self.ctx.store().require_order(order_id).await?;
        Ok(self.ctx.store().history_for_order(order_id).await?)
    }

    pub async fn order_shipment(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        self.ctx.store().require_order(order_id).await?;
        Ok(self.ctx.store().get_shipment(order_id).await?)
    }

    pub async fn user_coins(&self, user_id: UserId) -> Result<UserCoins> {
        let user = self
            .ctx
            .store()
            .get_user(user_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("User", user_id))?;
        let transactions = self.ctx.store().coin_transactions_for_user(user_id).await?;
        Ok(UserCoins { user, transactions })
    }

    /// Carrier courier-serviceability lookup, passed through as returned.
    pub async fn serviceability(&self, query: ServiceabilityQuery) -> Result<serde_json::Value> {
        self.ctx
            .bounded("carrier serviceability", self.ctx.carrier().serviceability(&query))
            .await
            .map_err(|e| FulfillmentError::ExternalService(e.to_string()))
    }
}
