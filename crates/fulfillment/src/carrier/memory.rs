//! Scripted in-memory carrier for testing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CarrierClient, ServiceabilityQuery, ShipmentCreated, ShipmentRequest};
use crate::error::CarrierError;

#[derive(Debug, Default)]
struct InMemoryCarrierState {
    create_script: VecDeque<Result<ShipmentCreated, CarrierError>>,
    create_calls: Vec<ShipmentRequest>,
    cancel_calls: Vec<String>,
    fail_on_cancel: bool,
    delay: Option<Duration>,
    next_id: u32,
}

/// In-memory carrier for testing.
///
/// `create_shipment` pops scripted responses first and succeeds with
/// generated ids once the script is empty.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrier {
    state: Arc<Mutex<InMemoryCarrierState>>,
}

impl InMemoryCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the response for the next `create_shipment` call.
    pub async fn push_create_response(&self, response: Result<ShipmentCreated, CarrierError>) {
        self.state.lock().await.create_script.push_back(response);
    }

    pub async fn set_fail_on_cancel(&self, fail: bool) {
        self.state.lock().await.fail_on_cancel = fail;
    }

    /// Delays every call, to exercise caller timeouts.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    pub async fn create_calls(&self) -> Vec<ShipmentRequest> {
        self.state.lock().await.create_calls.clone()
    }

    pub async fn cancel_calls(&self) -> Vec<String> {
        self.state.lock().await.cancel_calls.clone()
    }

    async fn pause(&self) {
        let delay = self.state.lock().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CarrierClient for InMemoryCarrier {
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, CarrierError> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.create_calls.push(request.clone());

        if let Some(scripted) = state.create_script.pop_front() {
            return scripted;
        }

        state.next_id += 1;
        let id = state.next_id;
        Ok(ShipmentCreated {
            carrier_order_id: Some(format!("SR-{id:04}")),
            shipment_id: Some(format!("SH-{id:04}")),
            status: Some("NEW".to_string()),
            ..Default::default()
        })
    }

    async fn cancel_shipment(&self, shipment_id: &str) -> Result<(), CarrierError> {
        self.pause().await;
        let mut state = self.state.lock().await;
        state.cancel_calls.push(shipment_id.to_string());

        if state.fail_on_cancel {
            return Err(CarrierError::Rejected {
                status: 400,
                message: "shipment already picked up".to_string(),
            });
        }
        Ok(())
    }

    async fn serviceability(
        &self,
        query: &ServiceabilityQuery,
    ) -> Result<serde_json::Value, CarrierError> {
        self.pause().await;
        Ok(serde_json::json!({
            "status": 200,
            "data": {
                "available_courier_companies": [
                    {
                        "courier_name": "Test Express",
                        "pickup_postcode": query.pickup_postcode,
                        "delivery_postcode": query.delivery_postcode,
                        "cod": if query.cod { 1 } else { 0 },
                    }
                ]
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_come_first() {
        let carrier = InMemoryCarrier::new();
        carrier
            .push_create_response(Err(CarrierError::Transport("reset".to_string())))
            .await;

        let request = dummy_request();
        assert!(carrier.create_shipment(&request).await.is_err());

        let created = carrier.create_shipment(&request).await.unwrap();
        assert_eq!(created.shipment_id.as_deref(), Some("SH-0001"));
        assert_eq!(carrier.create_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn cancel_failure_is_still_recorded() {
        let carrier = InMemoryCarrier::new();
        carrier.set_fail_on_cancel(true).await;

        assert!(carrier.cancel_shipment("SH-9").await.is_err());
        assert_eq!(carrier.cancel_calls().await, vec!["SH-9".to_string()]);
    }

    fn dummy_request() -> ShipmentRequest {
        use chrono::Utc;
        use common::{Money, OrderId};
        use domain::{Address, NewOrder, Order, OrderItem};

        let new = NewOrder::new(
            "ORD-1",
            "Test",
            "test@example.com",
            Address::default(),
            vec![OrderItem::new("P-1", "Pen", 1, Money::from_units(10))],
        );
        ShipmentRequest::for_order(&Order::place(OrderId::new(), new, Utc::now()), "Primary", Utc::now())
    }
}
