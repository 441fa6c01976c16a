use crate::AuctionId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const TOTAL_ITEMS_MIN: i64 = 1;
pub const TOTAL_ITEMS_MAX: i64 = 10_000;
pub const ITEMS_PER_ROUND_MIN: i64 = 1;
pub const ITEMS_PER_ROUND_MAX: i64 = 1_000;
pub const ROUND_DURATION_SECS_MIN: i64 = 60;
pub const ROUND_DURATION_SECS_MAX: i64 = 604_800;
pub const ANTI_SNIPE_WINDOW_SECS_MIN: i64 = 30;
pub const ANTI_SNIPE_WINDOW_SECS_MAX: i64 = 300;
pub const ANTI_SNIPE_EXTENSION_SECS_MIN: i64 = 30;
pub const ANTI_SNIPE_EXTENSION_SECS_MAX: i64 = 300;
pub const MAX_EXTENSIONS_MIN: i32 = 0;
pub const MAX_EXTENSIONS_MAX: i32 = 100;
pub const MIN_BID_STEP_PERCENT_MIN: i32 = 1;
pub const MIN_BID_STEP_PERCENT_MAX: i32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Register {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub initial_balance: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuction {
    pub name: String,
    pub total_items: i64,
    pub items_per_round: i64,
    pub start_time: jiff::Timestamp,
    pub round_duration_secs: i64,
    pub anti_snipe_window_secs: i64,
    pub anti_snipe_extension_secs: i64,
    pub max_extensions: i32,
    pub min_bid: Decimal,
    pub min_bid_step_percent: i32,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListAuctions {
    pub status: Option<crate::AuctionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBid {
    pub auction_id: AuctionId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncreaseBid {
    pub new_amount: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListTransactions {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
