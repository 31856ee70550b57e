//! Carrier (Shiprocket) API client.

pub mod http;
pub mod logging;
pub mod memory;
pub mod payload;
pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CarrierError;

pub use http::HttpCarrierClient;
pub use logging::TracingCarrier;
pub use memory::InMemoryCarrier;
pub use payload::{ShipmentItem, ShipmentRequest, normalize_phone};
pub use token::{LoginTokenProvider, StaticTokenProvider, TokenProvider};

/// Carrier acknowledgement of a created shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    #[serde(rename = "order_id", default, deserialize_with = "loose_id")]
    pub carrier_order_id: Option<String>,
    #[serde(default, deserialize_with = "loose_id")]
    pub shipment_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "loose_id")]
    pub awb_code: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub label_url: Option<String>,
}

/// Rate/serviceability lookup between two postcodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceabilityQuery {
    pub pickup_postcode: String,
    pub delivery_postcode: String,
    /// Parcel weight in kilograms.
    pub weight: f64,
    #[serde(default)]
    pub cod: bool,
}

/// Operations the fulfillment workflow needs from the carrier.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Creates an ad-hoc shipment order.
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, CarrierError>;

    /// Cancels a shipment by its carrier id.
    async fn cancel_shipment(&self, shipment_id: &str) -> Result<(), CarrierError>;

    /// Public courier serviceability lookup, returned as the carrier sent it.
    async fn serviceability(
        &self,
        query: &ServiceabilityQuery,
    ) -> Result<serde_json::Value, CarrierError>;
}

/// Reads an id the carrier may send as a number, a string or an empty string.
fn loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
