//! Carrier shipment provisioning and cancellation.

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, Shipment, ShipmentStatus};

use super::{AppliedFact, Step, StepKind};
use crate::carrier::{ShipmentCreated, ShipmentRequest};
use crate::context::FulfillmentContext;
use crate::error::{CarrierError, StepError};

/// Creates and cancels the single carrier shipment of an order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShipmentProvisioner;

impl ShipmentProvisioner {
    /// Creates the carrier shipment and stores it against the order.
    ///
    /// A wrong pickup location is retried exactly once with the location the
    /// carrier suggests; every other carrier error ends the attempt.
    #[tracing::instrument(skip(self, ctx, order), fields(order_id = %order.id))]
    pub async fn provision(
        &self,
        ctx: &FulfillmentContext,
        order: &Order,
    ) -> Result<AppliedFact, StepError> {
        if !order.is_ready_to_ship() {
            return Ok(AppliedFact::skipped(
                "order is unpaid or has an incomplete shipping address",
            ));
        }

        let mut pickup_location = ctx.settings().primary_pickup_location().to_string();
        let mut retried = false;

        let created = match self.create(ctx, order, &pickup_location).await {
            Err(StepError::Carrier(CarrierError::PickupLocation {
                message,
                suggested: Some(suggested),
            })) => {
                metrics::counter!("shipment_retries_total").increment(1);
                tracing::warn!(
                    rejected = %pickup_location,
                    suggested = %suggested,
                    error = %message,
                    "carrier rejected pickup location, retrying once"
                );
                pickup_location = suggested;
                retried = true;
                self.create(ctx, order, &pickup_location).await?
            }
            other => other?,
        };

        let now = ctx.now();
        let shipment = ctx
            .store()
            .upsert_shipment(&Shipment {
                order_id: order.id,
                carrier_order_id: created.carrier_order_id,
                carrier_shipment_id: created.shipment_id,
                status: ShipmentStatus::Created,
                awb_code: created.awb_code,
                tracking_url: created.tracking_url,
                label_url: created.label_url,
                pickup_location: Some(pickup_location.clone()),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(
            shipment_id = shipment.carrier_shipment_id.as_deref().unwrap_or("-"),
            pickup_location = %pickup_location,
            retried,
            "shipment created"
        );

        Ok(AppliedFact::ShipmentCreated {
            shipment_id: shipment.carrier_shipment_id,
            pickup_location,
            retried,
        })
    }

    /// Cancels the order's shipment with the carrier.
    ///
    /// Returns `false` when there is nothing to cancel. A row the carrier never
    /// acknowledged with an id cannot be cancelled remotely; it is logged and
    /// left as is. The local row is only marked cancelled after the carrier
    /// accepts the cancellation.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn cancel(&self, ctx: &FulfillmentContext, order_id: OrderId) -> Result<bool, StepError> {
        let Some(mut shipment) = ctx.store().get_shipment(order_id).await? else {
            return Ok(false);
        };
        if shipment.status == ShipmentStatus::Cancelled {
            return Ok(false);
        }
        let Some(carrier_id) = shipment
            .carrier_shipment_id
            .clone()
            .or_else(|| shipment.carrier_order_id.clone())
        else {
            tracing::warn!(
                %order_id,
                "shipment has no carrier id, skipping carrier cancellation"
            );
            return Ok(false);
        };

        ctx.bounded("carrier cancel", ctx.carrier().cancel_shipment(&carrier_id))
            .await?;

        shipment.status = ShipmentStatus::Cancelled;
        shipment.updated_at = ctx.now();
        ctx.store().upsert_shipment(&shipment).await?;
        Ok(true)
    }

    async fn create(
        &self,
        ctx: &FulfillmentContext,
        order: &Order,
        pickup_location: &str,
    ) -> Result<ShipmentCreated, StepError> {
        let request = ShipmentRequest::for_order(order, pickup_location, ctx.now());
        ctx.bounded("carrier create", ctx.carrier().create_shipment(&request))
            .await
    }
}

/// Order-creation step wrapping [`ShipmentProvisioner::provision`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ShipmentStep;

#[async_trait]
impl Step for ShipmentStep {
    fn kind(&self) -> StepKind {
        StepKind::Shipment
    }

    async fn apply(&self, ctx: &FulfillmentContext, order: &Order) -> Result<AppliedFact, StepError> {
        ShipmentProvisioner.provision(ctx, order).await
    }
}
