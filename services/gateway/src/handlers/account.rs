use axum::{
    extract::{Path, State},
    Json,
};
use types::account::TraderCapital;
use types::ids::TraderId;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_capital(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<TraderCapital>, AppError> {
    let trader_id = TraderId::try_new(user_id)
        .ok_or_else(|| AppError::BadRequest("user_id must not be empty".into()))?;
    Ok(Json(state.exchange.capital(&trader_id, state.now())))
}
