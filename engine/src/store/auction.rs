//! Auction lifecycle: creation, listing, manual start/cancel, and the
//! completion check that runs after every round closes.

use jiff_sqlx::ToSqlx;
use payloads::{
    AuctionId, AuctionStatus, BidStatus, RoundStatus, UserId,
    events::Event,
    requests::{self, CreateAuction},
    responses::{Auction, AuctionWithRounds, Round},
};
use sqlx::{FromRow, PgPool};

use super::{StoreError, ledger};
use crate::events::EventBus;
use crate::time::TimeSource;

fn validate(details: &CreateAuction) -> Result<(), StoreError> {
    fn in_range(
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), StoreError> {
        if value < min || value > max {
            return Err(StoreError::OutOfRange {
                field,
                min,
                max,
                value,
            });
        }
        Ok(())
    }

    in_range(
        "total_items",
        details.total_items,
        requests::TOTAL_ITEMS_MIN,
        requests::TOTAL_ITEMS_MAX,
    )?;
    in_range(
        "items_per_round",
        details.items_per_round,
        requests::ITEMS_PER_ROUND_MIN,
        requests::ITEMS_PER_ROUND_MAX,
    )?;
    in_range(
        "round_duration_secs",
        details.round_duration_secs,
        requests::ROUND_DURATION_SECS_MIN,
        requests::ROUND_DURATION_SECS_MAX,
    )?;
    in_range(
        "anti_snipe_window_secs",
        details.anti_snipe_window_secs,
        requests::ANTI_SNIPE_WINDOW_SECS_MIN,
        requests::ANTI_SNIPE_WINDOW_SECS_MAX,
    )?;
    in_range(
        "anti_snipe_extension_secs",
        details.anti_snipe_extension_secs,
        requests::ANTI_SNIPE_EXTENSION_SECS_MIN,
        requests::ANTI_SNIPE_EXTENSION_SECS_MAX,
    )?;
    in_range(
        "max_extensions",
        details.max_extensions as i64,
        requests::MAX_EXTENSIONS_MIN as i64,
        requests::MAX_EXTENSIONS_MAX as i64,
    )?;
    in_range(
        "min_bid_step_percent",
        details.min_bid_step_percent as i64,
        requests::MIN_BID_STEP_PERCENT_MIN as i64,
        requests::MIN_BID_STEP_PERCENT_MAX as i64,
    )?;
    if details.min_bid <= rust_decimal::Decimal::ZERO {
        return Err(StoreError::OutOfRange {
            field: "min_bid",
            min: 1,
            max: i64::MAX,
            value: 0,
        });
    }
    if details.anti_snipe_window_secs >= details.round_duration_secs {
        return Err(StoreError::AntiSnipeWindowTooLong);
    }

    Ok(())
}

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_auction(
    details: &CreateAuction,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<AuctionWithRounds, StoreError> {
    validate(details)?;

    let total_rounds = ((details.total_items + details.items_per_round - 1)
        / details.items_per_round)
        .max(1);

    let mut tx = pool.begin().await?;
    let now = time_source.now();

    let auction = sqlx::query_as::<_, Auction>(
        "INSERT INTO auctions (
            name, total_items, items_per_round, total_rounds, start_time,
            round_duration_secs, anti_snipe_window_secs,
            anti_snipe_extension_secs, max_extensions, min_bid,
            min_bid_step_percent, currency, status, current_round,
            created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 0, $14, $14
        ) RETURNING *",
    )
    .bind(&details.name)
    .bind(details.total_items)
    .bind(details.items_per_round)
    .bind(total_rounds)
    .bind(details.start_time.to_sqlx())
    .bind(details.round_duration_secs)
    .bind(details.anti_snipe_window_secs)
    .bind(details.anti_snipe_extension_secs)
    .bind(details.max_extensions)
    .bind(details.min_bid)
    .bind(details.min_bid_step_percent)
    .bind(&details.currency)
    .bind(AuctionStatus::Scheduled)
    .bind(now.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    let mut rounds = Vec::with_capacity(total_rounds as usize);
    let mut items_remaining = details.total_items;
    for round_number in 1..=total_rounds {
        let items_in_round = items_remaining.min(details.items_per_round);
        items_remaining -= items_in_round;

        let offset_secs = (round_number - 1) * details.round_duration_secs;
        let scheduled_start = details
            .start_time
            .checked_add(jiff::Span::new().seconds(offset_secs))
            .map_err(|e| StoreError::UnexpectedError(e.into()))?;
        let scheduled_end = scheduled_start
            .checked_add(jiff::Span::new().seconds(details.round_duration_secs))
            .map_err(|e| StoreError::UnexpectedError(e.into()))?;

        let round = sqlx::query_as::<_, Round>(
            "INSERT INTO auction_rounds (
                auction_id, round_number, items_in_round,
                scheduled_start_time, scheduled_end_time, extensions_count,
                status, winners_processed
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, false)
            RETURNING *",
        )
        .bind(auction.id)
        .bind(round_number)
        .bind(items_in_round)
        .bind(scheduled_start.to_sqlx())
        .bind(scheduled_end.to_sqlx())
        .bind(RoundStatus::Scheduled)
        .fetch_one(&mut *tx)
        .await?;

        rounds.push(round);
    }

    tx.commit().await?;

    Ok(AuctionWithRounds { auction, rounds })
}

pub async fn get_auction(
    auction_id: AuctionId,
    pool: &PgPool,
) -> Result<Auction, StoreError> {
    sqlx::query_as::<_, Auction>("SELECT * FROM auctions WHERE id = $1")
        .bind(auction_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::AuctionNotFound)
}

#[derive(FromRow)]
struct AuctionCount(i64);

pub async fn list_auctions(
    query: &requests::ListAuctions,
    pool: &PgPool,
) -> Result<(Vec<Auction>, i64), StoreError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let auctions = sqlx::query_as::<_, Auction>(
        "SELECT * FROM auctions
         WHERE $1::auction_status IS NULL OR status = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(query.status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let AuctionCount(total) = sqlx::query_as(
        "SELECT COUNT(*) FROM auctions WHERE $1::auction_status IS NULL OR status = $1",
    )
    .bind(query.status)
    .fetch_one(pool)
    .await?;

    Ok((auctions, total))
}

pub async fn get_current_round(
    auction_id: AuctionId,
    pool: &PgPool,
) -> Result<Round, StoreError> {
    let auction = get_auction(auction_id, pool).await?;
    sqlx::query_as::<_, Round>(
        "SELECT * FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
    )
    .bind(auction_id)
    .bind(auction.current_round)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::RoundNotFound)
}

/// Manually fast-start a scheduled auction: moves round 1's scheduled start
/// to now and flips the auction to active. The scheduler picks it up on its
/// next tick the same way it would have at the original start time.
#[tracing::instrument(skip(pool, time_source))]
pub async fn start_auction(
    auction_id: AuctionId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<Auction, StoreError> {
    let auction = get_auction(auction_id, pool).await?;
    if auction.status != AuctionStatus::Scheduled {
        return Err(StoreError::AuctionNotScheduled {
            found: auction.status,
        });
    }

    let now = time_source.now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE auction_rounds SET scheduled_start_time = $2
         WHERE auction_id = $1 AND round_number = 1",
    )
    .bind(auction_id)
    .bind(now.to_sqlx())
    .execute(&mut *tx)
    .await?;

    let updated = sqlx::query_as::<_, Auction>(
        "UPDATE auctions SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(auction_id)
    .bind(AuctionStatus::Active)
    .bind(now.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    bus.publish(Event::AuctionStarted {
        auction_id,
        name: updated.name.clone(),
        current_round: updated.current_round,
        start_time: now,
    });

    Ok(updated)
}

/// Cancel an auction, refunding every reservation held by active bids.
#[tracing::instrument(skip(pool, time_source))]
pub async fn cancel_auction(
    auction_id: AuctionId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<Auction, StoreError> {
    let auction = get_auction(auction_id, pool).await?;

    #[derive(FromRow)]
    struct ActiveBid {
        id: payloads::BidId,
        user_id: UserId,
        amount: rust_decimal::Decimal,
    }

    let mut tx = pool.begin().await?;

    let active_bids: Vec<ActiveBid> = sqlx::query_as(
        "SELECT id, user_id, amount FROM bids
         WHERE auction_id = $1 AND status IN ('active', 'carried_over')
         FOR UPDATE",
    )
    .bind(auction_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut refund_events = Vec::with_capacity(active_bids.len());
    for bid in active_bids {
        let user = ledger::get_user_for_update(&bid.user_id, &mut tx).await?;
        ledger::refund(&user, bid.amount, auction_id, bid.id, time_source, &mut tx)
            .await?;

        sqlx::query("UPDATE bids SET status = $2 WHERE id = $1")
            .bind(bid.id)
            .bind(BidStatus::Refunded)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO bid_history (bid_id, action, amount, round_number, created_at)
             SELECT $1, $2, amount, current_round, $3 FROM bids WHERE id = $1",
        )
        .bind(bid.id)
        .bind(payloads::BidHistoryAction::Refunded)
        .bind(time_source.now().to_sqlx())
        .execute(&mut *tx)
        .await?;

        refund_events.push(Event::BidRefunded {
            auction_id,
            user_id: bid.user_id,
            amount: bid.amount,
        });
    }

    let now = time_source.now();
    let updated = sqlx::query_as::<_, Auction>(
        "UPDATE auctions SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(auction_id)
    .bind(AuctionStatus::Cancelled)
    .bind(now.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    for event in refund_events {
        bus.publish(event);
    }

    Ok(updated)
}

/// Mark an auction completed once its final round has finished processing
/// winners. Called by the scheduler right after `round::complete_round`.
pub async fn check_completion(
    auction_id: AuctionId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<(), StoreError> {
    let auction = get_auction(auction_id, pool).await?;

    let last_round = sqlx::query_as::<_, Round>(
        "SELECT * FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
    )
    .bind(auction_id)
    .bind(auction.total_rounds)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::RoundNotFound)?;

    if last_round.winners_processed && auction.status == AuctionStatus::Active {
        sqlx::query(
            "UPDATE auctions SET status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(auction_id)
        .bind(AuctionStatus::Completed)
        .bind(time_source.now().to_sqlx())
        .execute(pool)
        .await?;

        let total_winners: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM won_items WHERE auction_id = $1",
        )
        .bind(auction_id)
        .fetch_one(pool)
        .await?;

        bus.publish(Event::AuctionCompleted {
            auction_id,
            total_rounds: auction.total_rounds.try_into().unwrap_or(i32::MAX),
            total_winners,
        });
    }

    Ok(())
}
