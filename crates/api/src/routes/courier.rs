//! Public courier serviceability lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use fulfillment::ServiceabilityQuery;

use crate::AppState;
use crate::error::ApiError;

/// GET /courier/serviceability: passes the carrier's answer through unchanged.
#[tracing::instrument(skip(state))]
pub async fn serviceability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServiceabilityQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !(query.weight.is_finite() && query.weight > 0.0) {
        return Err(ApiError::BadRequest(
            "weight must be a positive number".to_string(),
        ));
    }
    Ok(Json(state.orchestrator.serviceability(query).await?))
}
