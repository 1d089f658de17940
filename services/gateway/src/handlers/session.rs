use axum::{extract::State, Json};
use risk_engine::MarketState;

use crate::state::AppState;

pub async fn market_state(State(state): State<AppState>) -> Json<MarketState> {
    Json(state.exchange.market_state(state.now()))
}
