//! Time-based orchestration: starting auctions and rounds whose scheduled
//! time has arrived, closing out rounds whose end time has passed, and
//! extending rounds hit by anti-snipe bids that landed right at the wire.
//!
//! ```text
//! |--- scheduled ---|--- active ---|--- completed ---|
//!        ^                  ^
//!    start_time       actual_end_time (extendable)
//! ```
//!
//! Every scan below uses the same pattern: take a transaction-scoped
//! Postgres advisory lock on one row at a time so multiple scheduler
//! instances can run concurrently without double-processing the same
//! auction or round.

use std::sync::Arc;
use std::time::Duration;

use jiff_sqlx::ToSqlx;
use payloads::{AuctionId, RoundId};
use sqlx::PgPool;
use tokio::time;

use crate::events::EventBus;
use crate::{store, telemetry::log_error, time::TimeSource};

async fn record_scheduler_failure(pool: &PgPool, auction_id: AuctionId, now: jiff::Timestamp) {
    let result = sqlx::query(
        "UPDATE auctions
         SET scheduler_failure_count = scheduler_failure_count + 1,
             scheduler_last_failed_at = $2
         WHERE id = $1",
    )
    .bind(auction_id)
    .bind(now.to_sqlx())
    .execute(pool)
    .await;
    if let Err(e) = result {
        tracing::error!("failed to record scheduler failure for auction {auction_id}: {e:#}");
    }
}

async fn record_scheduler_success(pool: &PgPool, auction_id: AuctionId) {
    let result = sqlx::query(
        "UPDATE auctions
         SET scheduler_failure_count = 0, scheduler_last_failed_at = NULL
         WHERE id = $1 AND scheduler_failure_count != 0",
    )
    .bind(auction_id)
    .execute(pool)
    .await;
    if let Err(e) = result {
        tracing::error!("failed to clear scheduler failure for auction {auction_id}: {e:#}");
    }
}

/// Backoff predicate shared by every scan below: an auction that's failing
/// repeatedly is skipped until `backoff_secs(failure_count)` has elapsed
/// since its last failure, so a broken auction doesn't spin the tick loop.
const BACKOFF_CLAUSE: &str = "(auctions.scheduler_failure_count = 0
    OR auctions.scheduler_last_failed_at IS NULL
    OR auctions.scheduler_last_failed_at
        + (LEAST(1 << LEAST(auctions.scheduler_failure_count, 8), 300) * INTERVAL '1 second')
        <= $1)";

pub struct Scheduler {
    pool: PgPool,
    time_source: TimeSource,
    event_bus: Arc<EventBus>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        time_source: TimeSource,
        event_bus: Arc<EventBus>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            time_source,
            event_bus,
            tick_interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let _ = schedule_tick(&self.pool, &self.time_source, &self.event_bus)
                .await
                .map_err(log_error);
        }
    }
}

/// Run one scheduling pass: start due auctions, start due rounds, and close
/// out rounds whose end time has passed.
#[tracing::instrument(skip(pool, time_source, bus))]
pub async fn schedule_tick(
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> anyhow::Result<()> {
    process_auctions_to_start(pool, time_source, bus).await?;
    process_rounds_to_complete(pool, time_source, bus).await?;
    process_rounds_to_start(pool, time_source, bus).await?;
    Ok(())
}

#[tracing::instrument(skip(pool, time_source, bus))]
async fn process_auctions_to_start(
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> anyhow::Result<()> {
    loop {
        let mut coordination_tx = pool.begin().await?;
        let Some(auction_id) =
            lock_next_auction_to_start(&mut coordination_tx, time_source).await?
        else {
            break;
        };

        let now = time_source.now();
        match store::auction::start_auction(auction_id, pool, time_source, bus).await
        {
            Ok(_) => record_scheduler_success(pool, auction_id).await,
            Err(e) => {
                tracing::error!("failed to start auction {auction_id}: {e:#}");
                record_scheduler_failure(pool, auction_id, now).await;
            }
        }
        coordination_tx.commit().await?;
    }
    Ok(())
}

async fn lock_next_auction_to_start(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    time_source: &TimeSource,
) -> anyhow::Result<Option<AuctionId>> {
    let now = time_source.now().to_sqlx();
    sqlx::query_scalar(&format!(
        "SELECT auctions.id FROM auctions
         JOIN auction_rounds ON auction_rounds.auction_id = auctions.id
         WHERE auctions.status = 'scheduled'
           AND auction_rounds.round_number = 1
           AND auction_rounds.scheduled_start_time <= $1
           AND {BACKOFF_CLAUSE}
           AND pg_try_advisory_xact_lock(
               hashtextextended('auction_start:' || auctions.id::text, 0)
           )
         LIMIT 1"
    ))
    .bind(now)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Into::into)
}

#[tracing::instrument(skip(pool, time_source, bus))]
async fn process_rounds_to_start(
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> anyhow::Result<()> {
    loop {
        let mut coordination_tx = pool.begin().await?;
        let Some(round_id) =
            lock_next_round_to_start(&mut coordination_tx, time_source).await?
        else {
            break;
        };

        let now = time_source.now();
        let auction_id = round_owner(round_id, pool).await?;
        match store::round::start_round(round_id, pool, time_source, bus).await {
            Ok(_) => record_scheduler_success(pool, auction_id).await,
            Err(e) => {
                tracing::error!("failed to start round {round_id}: {e:#}");
                record_scheduler_failure(pool, auction_id, now).await;
            }
        }
        coordination_tx.commit().await?;
    }
    Ok(())
}

async fn round_owner(round_id: RoundId, pool: &PgPool) -> anyhow::Result<AuctionId> {
    sqlx::query_scalar("SELECT auction_id FROM auction_rounds WHERE id = $1")
        .bind(round_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

/// Only the auction's first round is ever started off its precomputed
/// schedule; every later round is chained directly out of the previous
/// round's `complete_round` so it can never start before the one before it
/// has actually finished.
async fn lock_next_round_to_start(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    time_source: &TimeSource,
) -> anyhow::Result<Option<RoundId>> {
    let now = time_source.now().to_sqlx();
    sqlx::query_scalar(&format!(
        "SELECT auction_rounds.id FROM auction_rounds
         JOIN auctions ON auctions.id = auction_rounds.auction_id
         WHERE auction_rounds.status = 'scheduled'
           AND auction_rounds.round_number = 1
           AND auctions.status = 'active'
           AND auction_rounds.scheduled_start_time <= $1
           AND {BACKOFF_CLAUSE}
           AND pg_try_advisory_xact_lock(
               hashtextextended('round_start:' || auction_rounds.id::text, 0)
           )
         LIMIT 1"
    ))
    .bind(now)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Into::into)
}

#[tracing::instrument(skip(pool, time_source, bus))]
async fn process_rounds_to_complete(
    pool: &PgPool,
    time_source: &TimeSource,
    bus: &EventBus,
) -> anyhow::Result<()> {
    loop {
        let mut coordination_tx = pool.begin().await?;
        let Some((auction_id, round_id)) =
            lock_next_round_to_complete(&mut coordination_tx, time_source).await?
        else {
            break;
        };

        let now = time_source.now();
        let mut failed = false;
        if let Err(e) =
            store::round::complete_round(round_id, pool, time_source, bus).await
        {
            tracing::error!("failed to complete round {round_id}: {e:#}");
            failed = true;
        } else if let Err(e) =
            store::auction::check_completion(auction_id, pool, time_source, bus)
                .await
        {
            tracing::error!(
                "failed to check completion for auction {auction_id}: {e:#}"
            );
            failed = true;
        }
        if failed {
            record_scheduler_failure(pool, auction_id, now).await;
        } else {
            record_scheduler_success(pool, auction_id).await;
        }
        coordination_tx.commit().await?;
    }
    Ok(())
}

async fn lock_next_round_to_complete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    time_source: &TimeSource,
) -> anyhow::Result<Option<(AuctionId, RoundId)>> {
    let now = time_source.now().to_sqlx();
    sqlx::query_as(&format!(
        "SELECT auction_rounds.auction_id, auction_rounds.id FROM auction_rounds
         JOIN auctions ON auctions.id = auction_rounds.auction_id
         WHERE auction_rounds.status = 'active'
           AND auction_rounds.winners_processed = false
           AND auction_rounds.actual_end_time <= $1
           AND {BACKOFF_CLAUSE}
           AND pg_try_advisory_xact_lock(
               hashtextextended('round_complete:' || auction_rounds.id::text, 0)
           )
         LIMIT 1"
    ))
    .bind(now)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Into::into)
}
