//! Order placement, status updates and per-order ledger reads.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{AffiliateId, Money, OrderId, UserId};
use domain::{
    Address, NewOrder, Order, OrderItem, OrderStatus, OrderStatusHistory, OrderUpdate,
    PaymentStatus, Shipment,
};
use fulfillment::StepOutcome;
use ledger_store::OrderQuery;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

/// Page size used when a listing does not ask for one.
const DEFAULT_PAGE_SIZE: usize = 50;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub order_number: String,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub items: Vec<OrderItemRequest>,
    /// Defaults to the sum of the item line totals.
    pub subtotal_cents: Option<i64>,
    #[serde(default)]
    pub shipping_cents: i64,
    #[serde(default)]
    pub tax_cents: i64,
    pub total_cents: i64,
    pub discount_code: Option<String>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub coins_used: i64,
    pub affiliate_id: Option<i64>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub cod: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_payment_method() -> String {
    "cod".to_string()
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
}

impl From<CreateOrderRequest> for NewOrder {
    fn from(req: CreateOrderRequest) -> Self {
        let items: Vec<OrderItem> = req
            .items
            .into_iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                product_name: item.product_name,
                sku: item.sku,
                quantity: item.quantity,
                unit_price: Money::from_cents(item.unit_price_cents),
                discount: Money::from_cents(item.discount_cents),
            })
            .collect();

        let mut new = NewOrder::new(
            req.order_number,
            req.customer_name,
            req.customer_email,
            req.shipping_address,
            items,
        );
        if let Some(subtotal) = req.subtotal_cents {
            new.subtotal = Money::from_cents(subtotal);
        }
        new.user_id = req.user_id.map(UserId::new);
        new.customer_phone = req.customer_phone;
        new.billing_address = req.billing_address;
        new.shipping_cost = Money::from_cents(req.shipping_cents);
        new.tax = Money::from_cents(req.tax_cents);
        new.total = Money::from_cents(req.total_cents);
        new.discount_code = req.discount_code;
        new.discount_amount = Money::from_cents(req.discount_cents);
        new.coins_used = req.coins_used;
        new.affiliate_id = req.affiliate_id.map(AffiliateId::new);
        new.payment_method = req.payment_method;
        new.payment_status = req.payment_status;
        new.cod = req.cod;
        new.tags = req.tags.into_iter().collect();
        new
    }
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub note: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub tags: Option<Vec<String>>,
    pub tracking_url: Option<String>,
}

impl From<UpdateOrderRequest> for OrderUpdate {
    fn from(req: UpdateOrderRequest) -> Self {
        OrderUpdate {
            status: req.status,
            note: req.note,
            payment_status: req.payment_status,
            tags: req.tags.map(|tags| tags.into_iter().collect::<BTreeSet<_>>()),
            tracking_url: req.tracking_url,
        }
    }
}

#[derive(Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: String,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub cod: bool,
    pub shipping_address: Address,
    pub items: Vec<OrderItemResponse>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub discount_code: Option<String>,
    pub coins_used: i64,
    pub affiliate_id: Option<i64>,
    pub tags: Vec<String>,
    pub tracking_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.clone(),
            user_id: order.user_id.map(|id| id.get()),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            status: order.status,
            payment_method: order.payment_method.clone(),
            payment_status: order.payment_status,
            cod: order.cod,
            shipping_address: order.shipping_address.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.clone(),
                    product_name: item.product_name.clone(),
                    sku: item.sku.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    discount_cents: item.discount.cents(),
                })
                .collect(),
            subtotal_cents: order.subtotal.cents(),
            shipping_cents: order.shipping_cost.cents(),
            tax_cents: order.tax.cents(),
            discount_cents: order.discount_amount.cents(),
            total_cents: order.total.cents(),
            discount_code: order.discount_code.clone(),
            coins_used: order.coins_used,
            affiliate_id: order.affiliate_id.map(|id| id.get()),
            tags: order.tags.iter().cloned().collect(),
            tracking_url: order.tracking_url.clone(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub side_effects: Vec<StepOutcome>,
}

#[derive(Serialize)]
pub struct HistoryEntryResponse {
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub note: Option<String>,
    pub created_at: String,
}

impl From<OrderStatusHistory> for HistoryEntryResponse {
    fn from(entry: OrderStatusHistory) -> Self {
        Self {
            old_status: entry.old_status,
            new_status: entry.new_status,
            note: entry.note,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order and run its side effects.
#[tracing::instrument(skip(state, payload))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let placement = state.orchestrator.create_order(req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order: OrderResponse::from(&placement.order),
            side_effects: placement.outcomes,
        }),
    ))
}

/// GET /orders: list orders, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let mut query = OrderQuery::new().limit(params.limit.unwrap_or(DEFAULT_PAGE_SIZE));
    if let Some(status) = params.status {
        query = query.status(status);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let orders = state.orchestrator.list_orders(query).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orchestrator.get_order(parse_order_id(&id)?).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}: status change, note and field updates.
#[tracing::instrument(skip(state, payload))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let order = state.orchestrator.update_order(order_id, req.into()).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/history
#[tracing::instrument(skip(state))]
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntryResponse>>, ApiError> {
    let entries = state
        .orchestrator
        .order_history(parse_order_id(&id)?)
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// GET /orders/{id}/shipment
#[tracing::instrument(skip(state))]
pub async fn shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shipment>, ApiError> {
    state
        .orchestrator
        .order_shipment(parse_order_id(&id)?)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No shipment for order {id}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
