use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use matching_engine::{OrderFilter, ReconcileReport};
use serde_json::json;
use types::errors::AdmissionError;
use types::ids::{NodeId, TraderId};
use types::market::Market;
use types::order::{Order, OrderStatus};

use crate::error::AppError;
use crate::exchange::parse_order_id;
use crate::models::{
    CreateOrderRequest, ListOrdersQuery, OrderListResponse, OrderResponse, UserQuery,
    MAX_LIST_LIMIT,
};
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    Query(user): Query<UserQuery>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, AppError> {
    let Json(payload) = payload.map_err(|r| AdmissionError::InvalidOrder(r.body_text()))?;
    let trader_id = user
        .trader()
        .ok_or_else(|| AdmissionError::InvalidOrder("user_id must not be empty".into()))?;
    let request = payload
        .into_new_order(trader_id)
        .ok_or_else(|| AdmissionError::InvalidOrder("node must not be empty".into()))?;

    let order = state.exchange.submit_order(request, state.now())?;
    let remaining = state
        .exchange
        .book()
        .remaining_slots(&order)
        .map_err(|e| AppError::Engine(e.into()))?;

    Ok(Json(OrderResponse {
        order_id: order.order_id,
        status: "success".to_string(),
        message: format!("{} order submitted", order.market),
        details: Some(json!({
            "order_status": order.status,
            "remaining_slots": remaining,
            "market": order.market,
            "node": order.node_id,
            "hour": order.hour_start,
            "time_slot": order.time_slot,
        })),
    }))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let market = query
        .market
        .as_deref()
        .map(|m| Market::parse(m).ok_or_else(|| AppError::BadRequest(format!("unknown market {m:?}"))))
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|s| OrderStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("unknown status {s:?}"))))
        .transpose()?;

    let filter = OrderFilter {
        trader_id: query.user_id.and_then(TraderId::try_new),
        node_id: query.node.and_then(NodeId::try_new),
        market,
        status,
        date: query.date,
        limit: query
            .limit
            .unwrap_or(OrderFilter::default().limit)
            .min(MAX_LIST_LIMIT),
    };
    let orders = state.exchange.list_orders(&filter)?;
    Ok(Json(OrderListResponse {
        count: orders.len(),
        orders,
    }))
}

/// Runs the stale-pending sweep and returns what it found
pub async fn stale_orders(
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, AppError> {
    Ok(Json(state.exchange.reconcile(state.now())?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(state.exchange.order(&order_id)?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = parse_order_id(&order_id)?;
    let order = state.exchange.cancel_order(&order_id, state.now())?;
    Ok(Json(OrderResponse {
        order_id: order.order_id,
        status: "success".to_string(),
        message: "Order cancelled".to_string(),
        details: Some(json!({ "order_status": order.status })),
    }))
}
