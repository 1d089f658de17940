use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::Value;
use types::errors::IngestError;
use types::market::Market;
use types::tick::PriceTick;

use crate::error::AppError;
use crate::models::{
    BatchIngestResponse, BatchItemResult, DayAheadPriceIngest, PriceIngestResponse,
    RealTimePriceIngest,
};
use crate::state::AppState;

fn malformed(reason: impl ToString) -> IngestError {
    IngestError::MalformedTick {
        reason: reason.to_string(),
    }
}

/// Ingestion runs matching and settlement synchronously under per-key
/// locks, so it is kept off the async workers
async fn ingest_one(state: &AppState, tick: PriceTick) -> Result<Json<PriceIngestResponse>, AppError> {
    let exchange = Arc::clone(&state.exchange);
    let now = state.now();
    let report = tokio::task::spawn_blocking(move || exchange.ingest(tick, now)).await??;
    Ok(Json(PriceIngestResponse::from(&report)))
}

pub async fn ingest_real_time(
    State(state): State<AppState>,
    payload: Result<Json<RealTimePriceIngest>, JsonRejection>,
) -> Result<Json<PriceIngestResponse>, AppError> {
    let Json(body) = payload.map_err(|r| malformed(r.body_text()))?;
    ingest_one(&state, body.into_tick()?).await
}

pub async fn ingest_day_ahead(
    State(state): State<AppState>,
    payload: Result<Json<DayAheadPriceIngest>, JsonRejection>,
) -> Result<Json<PriceIngestResponse>, AppError> {
    let Json(body) = payload.map_err(|r| malformed(r.body_text()))?;
    ingest_one(&state, body.into_tick()?).await
}

fn parse_item(market: Market, item: Value) -> Result<PriceTick, IngestError> {
    match market {
        Market::RealTime => serde_json::from_value::<RealTimePriceIngest>(item)
            .map_err(malformed)?
            .into_tick(),
        Market::DayAhead => serde_json::from_value::<DayAheadPriceIngest>(item)
            .map_err(malformed)?
            .into_tick(),
    }
}

/// Items are decoded one by one so a bad element fails alone
pub async fn ingest_batch(
    State(state): State<AppState>,
    Path(market): Path<String>,
    payload: Result<Json<Vec<Value>>, JsonRejection>,
) -> Result<Json<BatchIngestResponse>, AppError> {
    let market = Market::parse(&market)
        .ok_or_else(|| AppError::BadRequest(format!("unknown market {market:?}, expected rt or da")))?;
    let Json(items) = payload.map_err(|r| malformed(r.body_text()))?;
    state.exchange.ingester().check_batch(items.len())?;

    let mut results: Vec<Option<BatchItemResult>> = vec![None; items.len()];
    let mut indices = Vec::with_capacity(items.len());
    let mut ticks = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match parse_item(market, item) {
            Ok(tick) => {
                indices.push(index);
                ticks.push(tick);
            }
            Err(err) => results[index] = Some(BatchItemResult::error(index, err.to_string())),
        }
    }

    let exchange = Arc::clone(&state.exchange);
    let now = state.now();
    let reports = tokio::task::spawn_blocking(move || exchange.ingest_batch(ticks, now)).await??;
    for (index, report) in indices.into_iter().zip(reports) {
        results[index] = Some(match report {
            Ok(report) => BatchItemResult::success(index, &report),
            Err(err) => BatchItemResult::error(index, AppError::from(err).parts().2),
        });
    }

    Ok(Json(BatchIngestResponse::from_results(
        results.into_iter().flatten().collect(),
    )))
}
