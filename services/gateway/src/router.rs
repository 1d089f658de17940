use crate::handlers::{self, account, orders, pnl, prices, session};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let price_routes = Router::new()
        .route("/ingest/rt", post(prices::ingest_real_time))
        .route("/ingest/da", post(prices::ingest_day_ahead))
        .route("/ingest/batch/{market}", post(prices::ingest_batch));

    let pnl_routes = Router::new()
        .route("/simulate/day/{date}", post(pnl::simulate_day))
        .route("/order/{order_id}", get(pnl::order_pnl))
        .route("/revisions/{order_id}", get(pnl::revisions));

    Router::new()
        .nest("/prices", price_routes)
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/stale", get(orders::stale_orders))
        .route("/orders/{order_id}", get(orders::get_order))
        .route("/orders/{order_id}/cancel", put(orders::cancel_order))
        .nest("/pnl", pnl_routes)
        .route("/traders/{user_id}/capital", get(account::get_capital))
        .route("/session/market-state", get(session::market_state))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
