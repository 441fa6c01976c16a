use crate::{
    AuctionId, AuctionStatus, BidHistoryEntry, BidId, BidStatus, RoundId,
    RoundStatus, TransactionKind, UserId, WonItemId,
};
use jiff::Timestamp;
#[cfg(feature = "use-sqlx")]
use jiff_sqlx::Timestamp as SqlxTs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A page of auctions together with the total count matching the filter,
/// for `GET /auctions?page=&limit=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionList {
    pub auctions: Vec<Auction>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub balance: Decimal,
    pub reserved: Decimal,
    pub total_bids: i64,
    pub total_wins: i64,
    pub total_spent: Decimal,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

/// Returned by `POST /auth/register` and `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub balance: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Auction {
    pub id: AuctionId,
    pub name: String,
    pub total_items: i64,
    pub items_per_round: i64,
    pub total_rounds: i64,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub start_time: Timestamp,
    pub round_duration_secs: i64,
    pub anti_snipe_window_secs: i64,
    pub anti_snipe_extension_secs: i64,
    pub max_extensions: i32,
    pub min_bid: Decimal,
    pub min_bid_step_percent: i32,
    pub currency: String,
    pub status: AuctionStatus,
    pub current_round: i32,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub updated_at: Timestamp,
}

/// An auction together with the rounds precomputed at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionWithRounds {
    pub auction: Auction,
    pub rounds: Vec<Round>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Round {
    pub id: RoundId,
    pub auction_id: AuctionId,
    pub round_number: i32,
    pub items_in_round: i64,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub scheduled_start_time: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub scheduled_end_time: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "crate::OptionalTimestamp"))]
    pub actual_start_time: Option<Timestamp>,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "crate::OptionalTimestamp"))]
    pub actual_end_time: Option<Timestamp>,
    pub extensions_count: i32,
    pub status: RoundStatus,
    pub winners_processed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub created_in_round: i32,
    pub current_round: i32,
    pub status: BidStatus,
    pub won_item_number: Option<i64>,
    pub won_in_round: Option<i32>,
    pub won_position: Option<i32>,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
    pub version: i64,
}

/// A `Bid` together with its append-only history, returned from single-bid
/// lookups but not from leaderboard scans (which stay row-cheap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidWithHistory {
    pub bid: Bid,
    pub history: Vec<BidHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: i64,
    pub user_id: UserId,
    pub username: String,
    pub amount: Decimal,
    pub is_current_user: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub round_number: i32,
    pub cutoff_position: i64,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MyPosition {
    pub position: i64,
    pub total_bids: i64,
    pub is_winning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Transaction {
    pub id: crate::TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub auction_id: Option<AuctionId>,
    pub bid_id: Option<BidId>,
    pub description: String,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

/// A page of a user's transaction history, for `GET /users/me/transactions?page=&limit=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionList {
    pub transactions: Vec<Transaction>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct WonItem {
    pub id: WonItemId,
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub bid_id: BidId,
    pub item_number: i64,
    pub round_number: i32,
    pub position_in_round: i32,
    pub winning_bid_amount: Decimal,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}
