//! reqwest-backed carrier client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::{CarrierClient, ServiceabilityQuery, ShipmentCreated, ShipmentRequest, TokenProvider};
use crate::error::CarrierError;

/// Default carrier API root.
pub const DEFAULT_BASE_URL: &str = "https://apiv2.shiprocket.in/v1/external";

/// HTTP client for the carrier's external API.
pub struct HttpCarrierClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpCarrierClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, CarrierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CarrierError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url, tokens))
    }

    pub fn with_client(client: Client, base_url: &str, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, CarrierError> {
        let token = self.tokens.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CarrierError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CarrierError::Transport(e.to_string()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(CarrierError::Auth(error_message(&body, status.as_u16())));
        }
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }
        // Some endpoints report failures inside a 200 envelope
        if let Some(code) = body.get("status_code").and_then(Value::as_u64)
            && code >= 400
        {
            return Err(classify_error(code as u16, &body));
        }

        Ok(body)
    }
}

#[async_trait]
impl CarrierClient for HttpCarrierClient {
    #[tracing::instrument(skip(self, request), fields(order_number = %request.order_id, pickup = %request.pickup_location))]
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, CarrierError> {
        let body = self
            .send(
                self.client
                    .post(self.url("/orders/create/adhoc"))
                    .json(request),
            )
            .await?;

        serde_json::from_value(body).map_err(|e| CarrierError::Decode(e.to_string()))
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_shipment(&self, shipment_id: &str) -> Result<(), CarrierError> {
        self.send(
            self.client
                .post(self.url(&format!("/orders/cancel/shipment/{shipment_id}"))),
        )
        .await?;
        Ok(())
    }

    async fn serviceability(&self, query: &ServiceabilityQuery) -> Result<Value, CarrierError> {
        let params = [
            ("pickup_postcode", query.pickup_postcode.clone()),
            ("delivery_postcode", query.delivery_postcode.clone()),
            ("weight", query.weight.to_string()),
            ("cod", if query.cod { "1" } else { "0" }.to_string()),
        ];
        self.send(
            self.client
                .get(self.url("/courier/serviceability"))
                .query(&params),
        )
        .await
    }
}

/// Maps a failed carrier response to a [`CarrierError`].
///
/// A message mentioning the pickup location marks the recoverable case; the
/// carrier lists valid locations under `data.data[]` (or `data[]`).
pub fn classify_error(status: u16, body: &Value) -> CarrierError {
    let message = error_message(body, status);

    if message.to_lowercase().contains("pickup location") {
        return CarrierError::PickupLocation {
            suggested: suggested_pickup_location(body),
            message,
        };
    }

    CarrierError::Rejected { status, message }
}

fn suggested_pickup_location(body: &Value) -> Option<String> {
    let data = body.get("data")?;
    let candidates = data
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| data.as_array())?;

    candidates
        .iter()
        .filter_map(|entry| entry.get("pickup_location").and_then(Value::as_str))
        .map(str::trim)
        .find(|location| !location.is_empty())
        .map(str::to_string)
}

fn error_message(body: &Value, status: u16) -> String {
    match body {
        Value::String(text) if !text.trim().is_empty() => text.clone(),
        _ => body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| body.get("errors").map(Value::to_string))
            .unwrap_or_else(|| format!("HTTP {status}")),
    }
}
