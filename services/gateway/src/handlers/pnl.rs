use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use types::ids::{NodeId, OrderId, TraderId};
use types::pnl::{PnLRecord, Revision};

use crate::error::AppError;
use crate::exchange::{parse_order_id, DaySimulation};
use crate::models::{SimulateDayQuery, DEFAULT_NODE};
use crate::state::AppState;

pub async fn simulate_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<SimulateDayQuery>,
) -> Result<Json<DaySimulation>, AppError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date {date:?}, expected YYYY-MM-DD")))?;
    let node_id = NodeId::try_new(query.node.unwrap_or_else(|| DEFAULT_NODE.to_string()))
        .ok_or_else(|| AppError::BadRequest("node must not be empty".into()))?;
    let trader_id = query.user_id.and_then(TraderId::try_new);

    let simulation = state
        .exchange
        .simulate_day(date, &node_id, trader_id.as_ref(), state.now())?;
    Ok(Json(simulation))
}

pub async fn order_pnl(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<PnLRecord>, AppError> {
    let order_id = parse_order_id(&order_id)?;
    state
        .exchange
        .order_pnl(&order_id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} has no settlement yet")))
}

#[derive(Debug, Serialize)]
pub struct RevisionHistory {
    pub order_id: OrderId,
    pub revisions: Vec<Revision>,
}

pub async fn revisions(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<RevisionHistory>, AppError> {
    let order_id = parse_order_id(&order_id)?;
    let revisions = state.exchange.revisions(&order_id)?;
    Ok(Json(RevisionHistory {
        order_id,
        revisions,
    }))
}
