//! Domain events published by the engine's event bus and streamed to
//! subscribers over Server-Sent Events. Tagged by `type` so a client can
//! dispatch on one field without inspecting the payload shape.

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, BidId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "auction:started")]
    AuctionStarted {
        auction_id: AuctionId,
        name: String,
        current_round: i32,
        start_time: Timestamp,
    },
    #[serde(rename = "auction:completed")]
    AuctionCompleted {
        auction_id: AuctionId,
        total_rounds: i32,
        total_winners: i64,
    },
    #[serde(rename = "round:started")]
    RoundStarted {
        auction_id: AuctionId,
        round_number: i32,
        items_in_round: i64,
        scheduled_end_time: Timestamp,
    },
    #[serde(rename = "round:extended")]
    RoundExtended {
        auction_id: AuctionId,
        round_number: i32,
        new_end_time: Timestamp,
        extensions_count: i32,
    },
    #[serde(rename = "round:completed")]
    RoundCompleted {
        auction_id: AuctionId,
        round_number: i32,
        winners_count: i64,
    },
    #[serde(rename = "bid:placed")]
    BidPlaced {
        auction_id: AuctionId,
        bid_id: BidId,
        user_id: UserId,
        username: String,
        amount: Decimal,
        round_number: i32,
        ts: Timestamp,
    },
    #[serde(rename = "bid:increased")]
    BidIncreased {
        auction_id: AuctionId,
        bid_id: BidId,
        user_id: UserId,
        username: String,
        previous_amount: Decimal,
        new_amount: Decimal,
        round_number: i32,
        ts: Timestamp,
    },
    #[serde(rename = "leaderboard:updated")]
    LeaderboardUpdated {
        auction_id: AuctionId,
        round_number: i32,
        ts: Timestamp,
    },
    #[serde(rename = "user:won")]
    UserWon {
        auction_id: AuctionId,
        user_id: UserId,
        item_number: i64,
        amount: Decimal,
        round_number: i32,
    },
    #[serde(rename = "bid:refunded")]
    BidRefunded {
        auction_id: AuctionId,
        user_id: UserId,
        amount: Decimal,
    },
}

impl Event {
    /// The user this event should additionally be delivered to directly,
    /// outside the auction room, if any.
    pub fn direct_recipient(&self) -> Option<UserId> {
        match self {
            Event::UserWon { user_id, .. } => Some(*user_id),
            Event::BidRefunded { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn auction_id(&self) -> AuctionId {
        match self {
            Event::AuctionStarted { auction_id, .. }
            | Event::AuctionCompleted { auction_id, .. }
            | Event::RoundStarted { auction_id, .. }
            | Event::RoundExtended { auction_id, .. }
            | Event::RoundCompleted { auction_id, .. }
            | Event::BidPlaced { auction_id, .. }
            | Event::BidIncreased { auction_id, .. }
            | Event::LeaderboardUpdated { auction_id, .. }
            | Event::UserWon { auction_id, .. }
            | Event::BidRefunded { auction_id, .. } => *auction_id,
        }
    }
}
