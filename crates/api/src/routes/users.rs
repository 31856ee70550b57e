//! Customer coin balance endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::UserId;
use domain::CoinTransaction;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct UserCoinsResponse {
    pub user_id: i64,
    pub coin_balance: i64,
    pub transactions: Vec<CoinTransaction>,
}

/// GET /users/{id}/coins: balance and the transactions behind it.
#[tracing::instrument(skip(state))]
pub async fn coins(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<UserCoinsResponse>, ApiError> {
    let coins = state.orchestrator.user_coins(UserId::new(id)).await?;

    Ok(Json(UserCoinsResponse {
        user_id: coins.user.id.get(),
        coin_balance: coins.user.coin_balance,
        transactions: coins.transactions,
    }))
}
