//! Round state transitions: starting a round, extending it under
//! anti-snipe pressure, and closing it out by picking winners.

use jiff_sqlx::ToSqlx;
use payloads::{
    AuctionId, BidHistoryAction, BidStatus, RoundId, RoundStatus,
    events::Event,
    responses::Round,
};
use sqlx::{FromRow, PgPool};

use super::{StoreError, auction, ledger};
use crate::events::EventBus;
use crate::time::TimeSource;

/// Transition a scheduled round to active: every bid carried over from the
/// previous round becomes active, and the round's actual start/end times
/// are stamped from the current time rather than the precomputed schedule,
/// so a late scheduler tick doesn't shorten the round.
#[tracing::instrument(skip(pool, time_source))]
pub async fn start_round(
    round_id: RoundId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<Round, StoreError> {
    let round = sqlx::query_as::<_, Round>(
        "SELECT * FROM auction_rounds WHERE id = $1",
    )
    .bind(round_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::RoundNotFound)?;

    if round.status != RoundStatus::Scheduled {
        return Err(StoreError::RoundNotActive);
    }

    let now = time_source.now();
    let duration = round.scheduled_end_time - round.scheduled_start_time;
    let actual_end = now
        .checked_add(duration)
        .map_err(|e| StoreError::UnexpectedError(e.into()))?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Round>(
        "UPDATE auction_rounds
         SET status = $2, actual_start_time = $3, actual_end_time = $4
         WHERE id = $1
         RETURNING *",
    )
    .bind(round_id)
    .bind(RoundStatus::Active)
    .bind(now.to_sqlx())
    .bind(actual_end.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE bids SET status = $3, current_round = $2
         WHERE auction_id = $1 AND current_round = $2 AND status = 'carried_over'",
    )
    .bind(round.auction_id)
    .bind(round.round_number)
    .bind(BidStatus::Active)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE auctions SET current_round = $2 WHERE id = $1",
    )
    .bind(round.auction_id)
    .bind(round.round_number)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    bus.publish(Event::RoundStarted {
        auction_id: round.auction_id,
        round_number: round.round_number,
        items_in_round: round.items_in_round,
        scheduled_end_time: actual_end,
    });

    Ok(updated)
}

/// Extend a round's end time if a bid landed inside the anti-snipe window,
/// using a compare-and-set on `(status, extensions_count, actual_end_time)`
/// so two racing extension attempts never both apply.
#[tracing::instrument(skip(pool, time_source))]
pub async fn maybe_extend(
    auction_id: AuctionId,
    round_id: RoundId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<bool, StoreError> {
    let auction = auction::get_auction(auction_id, pool).await?;
    let round = sqlx::query_as::<_, Round>(
        "SELECT * FROM auction_rounds WHERE id = $1",
    )
    .bind(round_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::RoundNotFound)?;

    if round.status != RoundStatus::Active {
        return Ok(false);
    }
    if round.extensions_count >= auction.max_extensions {
        return Ok(false);
    }

    let Some(actual_end_time) = round.actual_end_time else {
        return Ok(false);
    };

    let now = time_source.now();
    if !is_within_anti_snipe_window(now, actual_end_time, auction.anti_snipe_window_secs)
    {
        return Ok(false);
    }

    let extension = jiff::Span::new().seconds(auction.anti_snipe_extension_secs);
    let new_end_time = actual_end_time
        .checked_add(extension)
        .map_err(|e| StoreError::UnexpectedError(e.into()))?;

    let result = sqlx::query(
        "UPDATE auction_rounds
         SET actual_end_time = $2, extensions_count = extensions_count + 1
         WHERE id = $1 AND status = 'active'
           AND extensions_count = $3 AND actual_end_time = $4",
    )
    .bind(round_id)
    .bind(new_end_time.to_sqlx())
    .bind(round.extensions_count)
    .bind(actual_end_time.to_sqlx())
    .execute(pool)
    .await?;

    let extended = result.rows_affected() == 1;
    if extended {
        bus.publish(Event::RoundExtended {
            auction_id,
            round_number: round.round_number,
            new_end_time,
            extensions_count: round.extensions_count + 1,
        });
    }

    Ok(extended)
}

#[derive(FromRow)]
struct RankedBid {
    id: payloads::BidId,
    user_id: payloads::UserId,
    amount: rust_decimal::Decimal,
}

/// Close out a round: the top `items_in_round` bids (ranked by amount
/// descending, ties broken by earliest creation) win an item each; the
/// rest carry over to the next round, or get a terminal refund if this was
/// the auction's last round. Idempotent via `winners_processed`.
#[tracing::instrument(skip(pool, time_source))]
pub async fn complete_round(
    round_id: RoundId,
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> Result<(), StoreError> {
    let round = sqlx::query_as::<_, Round>(
        "SELECT * FROM auction_rounds WHERE id = $1",
    )
    .bind(round_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::RoundNotFound)?;

    if round.winners_processed {
        return Ok(());
    }

    let auction = auction::get_auction(round.auction_id, pool).await?;
    let is_last_round = i64::from(round.round_number) == auction.total_rounds;

    let mut tx = pool.begin().await?;

    // Re-check under the transaction to guard against a concurrent tick.
    let locked: Round = sqlx::query_as(
        "SELECT * FROM auction_rounds WHERE id = $1 FOR UPDATE",
    )
    .bind(round_id)
    .fetch_one(&mut *tx)
    .await?;
    if locked.winners_processed {
        tx.rollback().await?;
        return Ok(());
    }

    let ranked: Vec<RankedBid> = sqlx::query_as(
        "SELECT id, user_id, amount FROM bids
         WHERE auction_id = $1 AND current_round = $2 AND status = 'active'
         ORDER BY amount DESC, created_at ASC
         FOR UPDATE",
    )
    .bind(round.auction_id)
    .bind(round.round_number)
    .fetch_all(&mut *tx)
    .await?;

    let now = time_source.now();
    let mut winners_count: i64 = 0;
    let mut post_commit_events = Vec::new();

    for (position, bid) in ranked.iter().enumerate() {
        let position = position as i64 + 1;
        let user = ledger::get_user_for_update(&bid.user_id, &mut tx).await?;

        if position <= round.items_in_round {
            ledger::commit_win(
                &user,
                bid.amount,
                round.auction_id,
                bid.id,
                time_source,
                &mut tx,
            )
            .await?;

            let item_number: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(item_number), 0) + 1 FROM won_items WHERE auction_id = $1",
            )
            .bind(round.auction_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO won_items (
                    auction_id, user_id, bid_id, item_number, round_number,
                    position_in_round, winning_bid_amount, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(round.auction_id)
            .bind(bid.user_id)
            .bind(bid.id)
            .bind(item_number)
            .bind(round.round_number)
            .bind(position as i32)
            .bind(bid.amount)
            .bind(now.to_sqlx())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE bids SET status = $2, won_item_number = $3,
                    won_in_round = $4, won_position = $5
                 WHERE id = $1",
            )
            .bind(bid.id)
            .bind(BidStatus::Won)
            .bind(item_number)
            .bind(round.round_number)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;

            record_history(
                bid.id,
                BidHistoryAction::Won,
                bid.amount,
                round.round_number,
                time_source,
                &mut tx,
            )
            .await?;

            winners_count += 1;
            post_commit_events.push(Event::UserWon {
                auction_id: round.auction_id,
                user_id: bid.user_id,
                item_number,
                amount: bid.amount,
                round_number: round.round_number,
            });
        } else if is_last_round {
            ledger::refund(
                &user,
                bid.amount,
                round.auction_id,
                bid.id,
                time_source,
                &mut tx,
            )
            .await?;

            sqlx::query("UPDATE bids SET status = $2 WHERE id = $1")
                .bind(bid.id)
                .bind(BidStatus::Refunded)
                .execute(&mut *tx)
                .await?;

            record_history(
                bid.id,
                BidHistoryAction::Refunded,
                bid.amount,
                round.round_number,
                time_source,
                &mut tx,
            )
            .await?;

            post_commit_events.push(Event::BidRefunded {
                auction_id: round.auction_id,
                user_id: bid.user_id,
                amount: bid.amount,
            });
        } else {
            sqlx::query(
                "UPDATE bids SET status = $2, current_round = current_round + 1 WHERE id = $1",
            )
            .bind(bid.id)
            .bind(BidStatus::CarriedOver)
            .execute(&mut *tx)
            .await?;

            record_history(
                bid.id,
                BidHistoryAction::CarriedOver,
                bid.amount,
                round.round_number,
                time_source,
                &mut tx,
            )
            .await?;
        }
    }

    sqlx::query(
        "UPDATE auction_rounds SET status = $2, winners_processed = true WHERE id = $1",
    )
    .bind(round_id)
    .bind(RoundStatus::Completed)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    bus.publish(Event::RoundCompleted {
        auction_id: round.auction_id,
        round_number: round.round_number,
        winners_count,
    });
    for event in post_commit_events {
        bus.publish(event);
    }

    // The precomputed schedule is advisory once a round has been extended,
    // so the next round's start is driven from here, at the instant this
    // one actually finished, rather than from its own stale
    // `scheduled_start_time`.
    if !is_last_round {
        let next_round_id: RoundId = sqlx::query_scalar(
            "SELECT id FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
        )
        .bind(round.auction_id)
        .bind(round.round_number + 1)
        .fetch_one(pool)
        .await?;
        start_round(next_round_id, pool, time_source, bus).await?;
    }

    Ok(())
}

/// A bid landing inside the anti-snipe window (i.e. within
/// `anti_snipe_window_secs` of the round's current end time) triggers an
/// extension.
fn is_within_anti_snipe_window(
    now: jiff::Timestamp,
    actual_end_time: jiff::Timestamp,
    anti_snipe_window_secs: i64,
) -> bool {
    if now >= actual_end_time {
        return false;
    }
    let window = jiff::Span::new().seconds(anti_snipe_window_secs);
    actual_end_time
        .checked_sub(window)
        .map(|threshold| now >= threshold)
        .unwrap_or(false)
}

async fn record_history(
    bid_id: payloads::BidId,
    action: BidHistoryAction,
    amount: rust_decimal::Decimal,
    round_number: i32,
    time_source: &TimeSource,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO bid_history (bid_id, action, amount, round_number, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(bid_id)
    .bind(action)
    .bind(amount)
    .bind(round_number)
    .bind(time_source.now().to_sqlx())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
