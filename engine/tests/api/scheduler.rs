use jiff::Span;
use payloads::AuctionStatus;
use test_helpers::spawn_app;

#[tokio::test]
async fn the_scheduler_starts_an_auction_once_its_start_time_arrives() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;
    assert_eq!(created.auction.status, AuctionStatus::Scheduled);

    // Not due yet: a tick right now shouldn't touch it.
    app.run_scheduler_tick().await?;
    let still_scheduled = app.client.get_auction(auction_id).await?;
    assert_eq!(still_scheduled.status, AuctionStatus::Scheduled);

    app.time_source.set(created.rounds[0].scheduled_start_time);
    app.run_scheduler_tick().await?;

    let started = app.client.get_auction(auction_id).await?;
    assert_eq!(started.status, AuctionStatus::Active);
    assert_eq!(started.current_round, 1);

    Ok(())
}

#[tokio::test]
async fn running_a_tick_twice_in_a_row_is_a_no_op_the_second_time() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;

    app.time_source.set(created.rounds[0].scheduled_start_time);
    app.run_scheduler_tick().await?;
    let after_first = app.client.get_auction(auction_id).await?;

    app.run_scheduler_tick().await?;
    let after_second = app.client.get_auction(auction_id).await?;

    assert_eq!(after_first, after_second);

    Ok(())
}

#[tokio::test]
async fn successful_ticks_keep_the_backoff_counter_at_zero() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;

    app.time_source.set(created.rounds[0].scheduled_start_time);
    app.run_scheduler_tick().await?;

    let failure_count: i32 = sqlx::query_scalar(
        "SELECT scheduler_failure_count FROM auctions WHERE id = $1",
    )
    .bind(auction_id)
    .fetch_one(&app.db_pool)
    .await?;
    assert_eq!(failure_count, 0);

    app.advance_past_round_end(&created.rounds[0]).await;
    app.run_scheduler_tick().await?;

    let failure_count_after_round_close: i32 = sqlx::query_scalar(
        "SELECT scheduler_failure_count FROM auctions WHERE id = $1",
    )
    .bind(auction_id)
    .fetch_one(&app.db_pool)
    .await?;
    assert_eq!(failure_count_after_round_close, 0);

    Ok(())
}

#[tokio::test]
async fn a_previously_failing_auction_is_skipped_until_its_backoff_elapses() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;
    let due = created.rounds[0].scheduled_start_time;

    // Simulate one prior failed attempt: with failure_count = 1 the backoff
    // ceiling is 1 << 1 = 2 seconds from the last failure.
    sqlx::query(
        "UPDATE auctions SET scheduler_failure_count = 1, scheduler_last_failed_at = $2
         WHERE id = $1",
    )
    .bind(auction_id)
    .bind(jiff_sqlx::ToSqlx::to_sqlx(due))
    .execute(&app.db_pool)
    .await?;

    app.time_source.set(due + Span::new().seconds(1));
    app.run_scheduler_tick().await?;
    let still_scheduled = app.client.get_auction(auction_id).await?;
    assert_eq!(
        still_scheduled.status, AuctionStatus::Scheduled,
        "still inside the 2-second backoff window"
    );

    app.time_source.advance(Span::new().seconds(2));
    app.run_scheduler_tick().await?;
    let started = app.client.get_auction(auction_id).await?;
    assert_eq!(started.status, AuctionStatus::Active);

    Ok(())
}
