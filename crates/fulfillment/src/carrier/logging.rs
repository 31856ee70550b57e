//! Carrier that logs requests instead of calling the carrier API.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{CarrierClient, ServiceabilityQuery, ShipmentCreated, ShipmentRequest};
use crate::error::CarrierError;

/// Carrier used when no credentials are configured.
///
/// Every shipment is acknowledged with a generated `OFFLINE-` id and written
/// to the log. Nothing is retained between calls.
#[derive(Debug, Default)]
pub struct TracingCarrier {
    next_id: AtomicU64,
}

impl TracingCarrier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CarrierClient for TracingCarrier {
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, CarrierError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            order_number = %request.order_id,
            pickup = %request.pickup_location,
            shipment_id = id,
            "offline carrier: shipment created"
        );
        Ok(ShipmentCreated {
            carrier_order_id: Some(format!("OFFLINE-{id}")),
            shipment_id: Some(format!("OFFLINE-{id}")),
            status: Some("NEW".to_string()),
            ..Default::default()
        })
    }

    async fn cancel_shipment(&self, shipment_id: &str) -> Result<(), CarrierError> {
        tracing::info!(shipment_id, "offline carrier: shipment cancelled");
        Ok(())
    }

    async fn serviceability(
        &self,
        query: &ServiceabilityQuery,
    ) -> Result<serde_json::Value, CarrierError> {
        tracing::info!(
            pickup = %query.pickup_postcode,
            delivery = %query.delivery_postcode,
            "offline carrier: serviceability lookup"
        );
        Ok(serde_json::json!({
            "status": 200,
            "data": { "available_courier_companies": [] }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, OrderId};
    use domain::{Address, NewOrder, Order, OrderItem};

    fn request() -> ShipmentRequest {
        let new = NewOrder::new(
            "ORD-2",
            "Test",
            "test@example.com",
            Address::default(),
            vec![OrderItem::new("P-1", "Pen", 1, Money::from_units(10))],
        );
        let order = Order::place(OrderId::new(), new, Utc::now());
        ShipmentRequest::for_order(&order, "Primary", Utc::now())
    }

    #[tokio::test]
    async fn generates_distinct_ids() {
        let carrier = TracingCarrier::new();
        let request = request();

        let first = carrier.create_shipment(&request).await.unwrap();
        let second = carrier.create_shipment(&request).await.unwrap();

        assert_eq!(first.shipment_id.as_deref(), Some("OFFLINE-1"));
        assert_eq!(second.shipment_id.as_deref(), Some("OFFLINE-2"));
        assert!(carrier.cancel_shipment("OFFLINE-1").await.is_ok());
    }

    #[tokio::test]
    async fn serviceability_lists_no_couriers() {
        let carrier = TracingCarrier::new();
        let query = ServiceabilityQuery {
            pickup_postcode: "411001".to_string(),
            delivery_postcode: "560001".to_string(),
            weight: 0.5,
            cod: false,
        };

        let answer = carrier.serviceability(&query).await.unwrap();
        assert_eq!(answer["data"]["available_courier_companies"], serde_json::json!([]));
    }
}
