pub mod account;
pub mod orders;
pub mod pnl;
pub mod prices;
pub mod session;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
