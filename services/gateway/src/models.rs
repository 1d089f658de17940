use chrono::{DateTime, NaiveDate, Utc};
use matching_engine::{MatchOutcome, MatchResult, MatchStatus};
use market_data::UpsertOutcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::SettlementUpdate;
use types::errors::IngestError;
use types::ids::{NodeId, OrderId, TraderId};
use types::market::Market;
use types::numeric::{Price, Quantity};
use types::order::{NewOrder, Order, OrderType, Side, TimeInForce};
use types::pnl::DataQuality;
use types::tick::{PriceQuality, PriceTick};

use crate::exchange::IngestReport;

pub const DEFAULT_USER: &str = "demo_user";
pub const DEFAULT_NODE: &str = "PJM_RTO";
pub const MAX_LIST_LIMIT: usize = 500;

fn node(raw: String) -> Result<NodeId, IngestError> {
    NodeId::try_new(raw).ok_or_else(|| IngestError::MalformedTick {
        reason: "node_id must not be empty".to_string(),
    })
}

fn required(price: Option<Price>, field: &str) -> Result<Price, IngestError> {
    price.ok_or_else(|| IngestError::MalformedTick {
        reason: format!("{field} is required"),
    })
}

// ---- price ingestion ----

/// Real-time 5-minute LMP delivered by the upstream feed
#[derive(Debug, Clone, Deserialize)]
pub struct RealTimePriceIngest {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub lmp: Option<Price>,
    #[serde(default)]
    pub energy_component: Option<Price>,
    #[serde(default)]
    pub congestion_component: Option<Price>,
    #[serde(default)]
    pub loss_component: Option<Price>,
    #[serde(default)]
    pub quality: Option<PriceQuality>,
}

impl RealTimePriceIngest {
    pub fn into_tick(self) -> Result<PriceTick, IngestError> {
        let mut tick = PriceTick::real_time(node(self.node_id)?, self.timestamp, required(self.lmp, "lmp")?);
        tick.energy_component = self.energy_component;
        tick.congestion_component = self.congestion_component;
        tick.loss_component = self.loss_component;
        if let Some(quality) = self.quality {
            tick.quality = quality;
        }
        Ok(tick)
    }
}

/// Day-ahead hourly clearing price
#[derive(Debug, Clone, Deserialize)]
pub struct DayAheadPriceIngest {
    pub node_id: String,
    pub hour_start: DateTime<Utc>,
    pub clearing_price: Option<Price>,
    #[serde(default)]
    pub quality: Option<PriceQuality>,
}

impl DayAheadPriceIngest {
    pub fn into_tick(self) -> Result<PriceTick, IngestError> {
        let tick = PriceTick::day_ahead(
            node(self.node_id)?,
            self.hour_start,
            required(self.clearing_price, "clearing_price")?,
        );
        Ok(match self.quality {
            Some(quality) => tick.with_quality(quality),
            None => tick,
        })
    }
}

/// Per-pass matching summary returned inline with an ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSummary {
    pub status: String,
    pub tick: String,
    pub reference_price: Price,
    pub orders_evaluated: usize,
    pub filled: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub results: Vec<MatchResult>,
}

impl From<&MatchOutcome> for MatchingSummary {
    fn from(outcome: &MatchOutcome) -> Self {
        let count = |status: MatchStatus| outcome.results.iter().filter(|r| r.status == status).count();
        Self {
            status: "completed".to_string(),
            tick: outcome.key.to_string(),
            reference_price: outcome.reference_price,
            orders_evaluated: outcome.results.len(),
            filled: count(MatchStatus::Filled),
            rejected: count(MatchStatus::Rejected),
            cancelled: count(MatchStatus::Cancelled),
            skipped: count(MatchStatus::Skipped),
            results: outcome.results.clone(),
        }
    }
}

/// One settlement record promoted by an ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub order_id: OrderId,
    pub version: u32,
    pub hour_pnl: Decimal,
    pub delta: Decimal,
    pub data_quality: DataQuality,
}

impl From<&SettlementUpdate> for SettlementSummary {
    fn from(update: &SettlementUpdate) -> Self {
        Self {
            order_id: update.record.order_id(),
            version: update.record.version(),
            hour_pnl: update.record.hour_pnl(),
            delta: update.delta,
            data_quality: update.record.data_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceIngestResponse {
    pub status: String,
    pub outcome: UpsertOutcome,
    pub message: String,
    pub matching_triggered: bool,
    pub matching_results: Option<MatchingSummary>,
    pub settlements: Vec<SettlementSummary>,
}

impl From<&IngestReport> for PriceIngestResponse {
    fn from(report: &IngestReport) -> Self {
        let message = match report.outcome {
            UpsertOutcome::Inserted => format!("{} price ingested", report.key.market),
            UpsertOutcome::Duplicate => "duplicate tick ignored".to_string(),
            UpsertOutcome::Retry => "tick re-delivered, matching retried".to_string(),
            UpsertOutcome::Replaced => "price replaced, matching re-run".to_string(),
            UpsertOutcome::Revised => "verified price accepted, settlements revised".to_string(),
        };
        Self {
            status: "success".to_string(),
            outcome: report.outcome,
            message,
            matching_triggered: report.matching_triggered,
            matching_results: report.matching.as_ref().map(MatchingSummary::from),
            settlements: report.settlements.iter().map(SettlementSummary::from).collect(),
        }
    }
}

/// Per-item result of a batch ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<UpsertOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub matching_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_results: Option<MatchingSummary>,
}

impl BatchItemResult {
    pub fn success(index: usize, report: &IngestReport) -> Self {
        Self {
            index,
            status: "success".to_string(),
            outcome: Some(report.outcome),
            error: None,
            matching_triggered: report.matching_triggered,
            matching_results: report.matching.as_ref().map(MatchingSummary::from),
        }
    }

    pub fn error(index: usize, error: String) -> Self {
        Self {
            index,
            status: "error".to_string(),
            outcome: None,
            error: Some(error),
            matching_triggered: false,
            matching_results: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIngestResponse {
    pub status: String,
    pub total_prices: usize,
    pub processed: usize,
    pub failed: usize,
    pub matching_triggered: usize,
    pub results: Vec<BatchItemResult>,
}

impl BatchIngestResponse {
    pub fn from_results(results: Vec<BatchItemResult>) -> Self {
        let processed = results.iter().filter(|r| r.error.is_none()).count();
        Self {
            status: "completed".to_string(),
            total_prices: results.len(),
            processed,
            failed: results.len() - processed,
            matching_triggered: results.iter().filter(|r| r.matching_triggered).count(),
            results,
        }
    }
}

// ---- orders ----

#[derive(Debug, Clone, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

impl UserQuery {
    pub fn trader(&self) -> Option<TraderId> {
        TraderId::try_new(self.user_id.clone().unwrap_or_else(|| DEFAULT_USER.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub market: Market,
    pub node: String,
    pub hour_start: DateTime<Utc>,
    #[serde(default)]
    pub time_slot: Option<DateTime<Utc>>,
    pub side: Side,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub limit_price: Option<Price>,
    pub quantity_mwh: Quantity,
    #[serde(default = "default_time_in_force")]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

fn default_time_in_force() -> TimeInForce {
    TimeInForce::GTC
}

impl CreateOrderRequest {
    /// Build the book request; `None` when the node id is empty
    pub fn into_new_order(self, trader_id: TraderId) -> Option<NewOrder> {
        Some(NewOrder {
            trader_id,
            node_id: NodeId::try_new(self.node)?,
            market: self.market,
            hour_start: self.hour_start,
            time_slot: self.time_slot,
            side: self.side,
            order_type: self.order_type,
            limit_price: self.limit_price,
            quantity: self.quantity_mwh,
            time_in_force: self.time_in_force,
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListOrdersQuery {
    pub date: Option<NaiveDate>,
    pub node: Option<String>,
    pub market: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub count: usize,
    pub orders: Vec<Order>,
}

// ---- P&L ----

#[derive(Debug, Clone, Deserialize)]
pub struct SimulateDayQuery {
    pub node: Option<String>,
    pub user_id: Option<String>,
}
