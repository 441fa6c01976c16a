//! Placing, increasing, and cancelling bids, plus the read paths that
//! expose where a user stands.

use jiff_sqlx::ToSqlx;
use payloads::{
    AuctionId, AuctionStatus, BidHistoryAction, BidId, BidStatus, RoundStatus,
    TransactionKind, UserId,
    events::Event,
    responses::{Bid, BidWithHistory, Leaderboard, LeaderboardEntry, MyPosition},
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::{StoreError, auction, ledger, round};
use crate::events::EventBus;
use crate::time::TimeSource;

const MAX_INCREASE_RETRIES: u32 = 3;

fn min_bid_for_increase(current: Decimal, step_percent: i32) -> Decimal {
    current + current * Decimal::from(step_percent) / Decimal::from(100)
}

#[tracing::instrument(skip(pool, time_source))]
pub async fn place_bid(
    user_id: UserId,
    auction_id: AuctionId,
    amount: Decimal,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<Bid, StoreError> {
    let auction = auction::get_auction(auction_id, pool).await?;
    if auction.status != AuctionStatus::Active {
        return Err(StoreError::AuctionNotActive);
    }
    if amount < auction.min_bid {
        return Err(StoreError::BidTooLow {
            amount,
            minimum: auction.min_bid,
        });
    }

    let current_round_status: Option<RoundStatus> = sqlx::query_scalar(
        "SELECT status FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
    )
    .bind(auction_id)
    .bind(auction.current_round)
    .fetch_optional(pool)
    .await?;
    if current_round_status != Some(RoundStatus::Active) {
        return Err(StoreError::RoundNotActive);
    }

    let mut tx = pool.begin().await?;

    let existing: Option<BidId> = sqlx::query_scalar(
        "SELECT id FROM bids WHERE auction_id = $1 AND user_id = $2
         AND status IN ('active', 'carried_over') FOR UPDATE",
    )
    .bind(auction_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(StoreError::AlreadyBidding);
    }

    let user = ledger::get_user_for_update(&user_id, &mut tx).await?;

    let now = time_source.now();
    let bid = sqlx::query_as::<_, Bid>(
        "INSERT INTO bids (
            auction_id, user_id, amount, original_amount, created_in_round,
            current_round, status, created_at, version
        ) VALUES ($1, $2, $3, $3, $4, $4, $5, $6, 0)
        RETURNING *",
    )
    .bind(auction_id)
    .bind(user_id)
    .bind(amount)
    .bind(auction.current_round)
    .bind(BidStatus::Active)
    .bind(now.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    ledger::reserve(
        &user,
        amount,
        auction_id,
        bid.id,
        TransactionKind::BidPlaced,
        time_source,
        &mut tx,
    )
    .await?;

    record_history(bid.id, BidHistoryAction::Created, amount, None, auction.current_round, time_source, &mut tx)
        .await?;

    sqlx::query("UPDATE users SET total_bids = total_bids + 1 WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    bus.publish(Event::BidPlaced {
        auction_id,
        bid_id: bid.id,
        user_id,
        username: user.username.clone(),
        amount,
        round_number: auction.current_round,
        ts: now,
    });
    bus.publish(Event::LeaderboardUpdated {
        auction_id,
        round_number: auction.current_round,
        ts: now,
    });

    let _ = round::maybe_extend(
        auction_id,
        current_round_id(auction_id, auction.current_round, pool).await?,
        pool,
        time_source,
        bus,
    )
    .await;

    Ok(bid)
}

async fn current_round_id(
    auction_id: AuctionId,
    round_number: i32,
    pool: &PgPool,
) -> Result<payloads::RoundId, StoreError> {
    sqlx::query_scalar(
        "SELECT id FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
    )
    .bind(auction_id)
    .bind(round_number)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::RoundNotFound)
}

/// Increase an existing bid's amount. Uses the stored `version` column as
/// an optimistic lock: if the round state changed underneath us (it got
/// extended and closed out between our read and write), retry up to
/// `MAX_INCREASE_RETRIES` times before giving up.
#[tracing::instrument(skip(pool, time_source))]
pub async fn increase_bid(
    bid_id: BidId,
    user_id: UserId,
    new_amount: Decimal,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<Bid, StoreError> {
    for attempt in 0..MAX_INCREASE_RETRIES {
        match try_increase_bid(bid_id, user_id, new_amount, pool, time_source, bus)
            .await
        {
            Ok(bid) => return Ok(bid),
            Err(StoreError::VersionConflict) if attempt + 1 < MAX_INCREASE_RETRIES => {
                tokio::time::sleep(std::time::Duration::from_millis(
                    100 * (attempt as u64 + 1),
                ))
                .await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(StoreError::VersionConflict)
}

async fn try_increase_bid(
    bid_id: BidId,
    user_id: UserId,
    new_amount: Decimal,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<Bid, StoreError> {
    let mut tx = pool.begin().await?;

    let bid = sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE id = $1 FOR UPDATE")
        .bind(bid_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::BidNotFound)?;

    if bid.user_id != user_id {
        return Err(StoreError::BidNotOwned);
    }
    if bid.status != BidStatus::Active && bid.status != BidStatus::CarriedOver {
        return Err(StoreError::BidNotActive);
    }

    let auction = auction::get_auction(bid.auction_id, pool).await?;
    let minimum = min_bid_for_increase(bid.amount, auction.min_bid_step_percent);
    if new_amount < minimum {
        return Err(StoreError::BidTooLow {
            amount: new_amount,
            minimum,
        });
    }

    let delta = new_amount - bid.amount;
    let user = ledger::get_user_for_update(&user_id, &mut tx).await?;
    ledger::reserve(
        &user,
        delta,
        bid.auction_id,
        bid.id,
        TransactionKind::BidIncreased,
        time_source,
        &mut tx,
    )
    .await?;

    let result = sqlx::query_as::<_, Bid>(
        "UPDATE bids SET amount = $2, version = version + 1
         WHERE id = $1 AND version = $3
         RETURNING *",
    )
    .bind(bid_id)
    .bind(new_amount)
    .bind(bid.version)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::VersionConflict)?;

    record_history(
        bid_id,
        BidHistoryAction::Increased,
        new_amount,
        Some(bid.amount),
        result.current_round,
        time_source,
        &mut tx,
    )
    .await?;

    tx.commit().await?;

    bus.publish(Event::BidIncreased {
        auction_id: bid.auction_id,
        bid_id,
        user_id,
        username: user.username.clone(),
        previous_amount: bid.amount,
        new_amount,
        round_number: result.current_round,
        ts: time_source.now(),
    });
    bus.publish(Event::LeaderboardUpdated {
        auction_id: bid.auction_id,
        round_number: result.current_round,
        ts: time_source.now(),
    });

    let _ = round::maybe_extend(
        bid.auction_id,
        current_round_id(bid.auction_id, result.current_round, pool).await?,
        pool,
        time_source,
        bus,
    )
    .await;

    Ok(result)
}

/// Cancel a bid. Only allowed while the round it currently sits in hasn't
/// started yet, matching the window in which a user could instead have
/// just not bid at all.
#[tracing::instrument(skip(pool, time_source))]
pub async fn cancel_bid(
    bid_id: BidId,
    user_id: UserId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    let bid = sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE id = $1 FOR UPDATE")
        .bind(bid_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::BidNotFound)?;

    if bid.user_id != user_id {
        return Err(StoreError::BidNotOwned);
    }

    let round_status: RoundStatus = sqlx::query_scalar(
        "SELECT status FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
    )
    .bind(bid.auction_id)
    .bind(bid.current_round)
    .fetch_one(&mut *tx)
    .await?;
    if round_status != RoundStatus::Scheduled {
        return Err(StoreError::RoundNotScheduled);
    }

    let user = ledger::get_user_for_update(&user_id, &mut tx).await?;
    ledger::refund(&user, bid.amount, bid.auction_id, bid.id, time_source, &mut tx)
        .await?;

    sqlx::query("UPDATE bids SET status = $2 WHERE id = $1")
        .bind(bid_id)
        .bind(BidStatus::Refunded)
        .execute(&mut *tx)
        .await?;

    record_history(
        bid_id,
        BidHistoryAction::Refunded,
        bid.amount,
        None,
        bid.current_round,
        time_source,
        &mut tx,
    )
    .await?;

    tx.commit().await?;

    bus.publish(Event::BidRefunded {
        auction_id: bid.auction_id,
        user_id,
        amount: bid.amount,
    });

    Ok(())
}

pub async fn get_bid_with_history(
    bid_id: BidId,
    pool: &PgPool,
) -> Result<BidWithHistory, StoreError> {
    let bid = sqlx::query_as::<_, Bid>("SELECT * FROM bids WHERE id = $1")
        .bind(bid_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::BidNotFound)?;

    let history = sqlx::query_as::<_, payloads::BidHistoryEntry>(
        "SELECT * FROM bid_history WHERE bid_id = $1 ORDER BY created_at ASC",
    )
    .bind(bid_id)
    .fetch_all(pool)
    .await?;

    Ok(BidWithHistory { bid, history })
}

const LEADERBOARD_CUTOFF_PADDING: i64 = 5;

#[tracing::instrument(skip(pool))]
pub async fn get_leaderboard(
    auction_id: AuctionId,
    round_number: i32,
    current_user: Option<UserId>,
    pool: &PgPool,
) -> Result<Leaderboard, StoreError> {
    let auction = auction::get_auction(auction_id, pool).await?;

    #[derive(FromRow)]
    struct Ranked {
        user_id: UserId,
        amount: Decimal,
    }

    let ranked: Vec<Ranked> = sqlx::query_as(
        "SELECT user_id, amount FROM bids
         WHERE auction_id = $1 AND current_round = $2
           AND status IN ('active', 'carried_over', 'won')
         ORDER BY amount DESC, created_at ASC
         LIMIT $3",
    )
    .bind(auction_id)
    .bind(round_number)
    .bind(auction.items_per_round + LEADERBOARD_CUTOFF_PADDING)
    .fetch_all(pool)
    .await?;

    let user_ids: Vec<UserId> = ranked.iter().map(|r| r.user_id).collect();
    let usernames = super::get_usernames(&user_ids, pool).await?;

    let entries = ranked
        .into_iter()
        .enumerate()
        .map(|(i, r)| LeaderboardEntry {
            position: i as i64 + 1,
            user_id: r.user_id,
            username: usernames.get(&r.user_id).cloned().unwrap_or_default(),
            amount: r.amount,
            is_current_user: current_user == Some(r.user_id),
        })
        .collect();

    Ok(Leaderboard {
        round_number,
        cutoff_position: auction.items_per_round,
        entries,
    })
}

#[tracing::instrument(skip(pool))]
pub async fn get_my_position(
    auction_id: AuctionId,
    user_id: UserId,
    pool: &PgPool,
) -> Result<MyPosition, StoreError> {
    let auction = auction::get_auction(auction_id, pool).await?;

    #[derive(FromRow)]
    struct Ranked {
        user_id: UserId,
    }

    let ranked: Vec<Ranked> = sqlx::query_as(
        "SELECT user_id FROM bids
         WHERE auction_id = $1 AND current_round = $2
           AND status IN ('active', 'carried_over', 'won')
         ORDER BY amount DESC, created_at ASC",
    )
    .bind(auction_id)
    .bind(auction.current_round)
    .fetch_all(pool)
    .await?;

    let position = ranked
        .iter()
        .position(|r| r.user_id == user_id)
        .map(|i| i as i64 + 1)
        .unwrap_or(0);

    let total_bids: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bids WHERE user_id = $1 AND status != 'refunded'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(MyPosition {
        position,
        total_bids,
        is_winning: position >= 1 && position <= auction.items_per_round,
    })
}

#[allow(clippy::too_many_arguments)]
async fn record_history(
    bid_id: BidId,
    action: BidHistoryAction,
    amount: Decimal,
    prev_amount: Option<Decimal>,
    round_number: i32,
    time_source: &TimeSource,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO bid_history (bid_id, action, amount, round_number, created_at, prev_amount)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(bid_id)
    .bind(action)
    .bind(amount)
    .bind(round_number)
    .bind(time_source.now().to_sqlx())
    .bind(prev_amount)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
