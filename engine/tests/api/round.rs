use jiff::Span;
use payloads::{AuctionStatus, BidStatus, requests};
use rust_decimal::dec;
use test_helpers::spawn_app;

#[tokio::test]
async fn a_bid_inside_the_anti_snipe_window_extends_the_round() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let mut details = test_helpers::basic_auction_details(app.time_source.now());
    details.round_duration_secs = 120;
    details.anti_snipe_window_secs = 30;
    details.anti_snipe_extension_secs = 30;
    let created = app.client.create_auction(&details).await?;
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await?;
    app.run_scheduler_tick().await?;

    let round_before = app.client.current_round(auction_id).await?;
    assert_eq!(round_before.extensions_count, 0);

    app.time_source
        .set(round_before.actual_end_time.unwrap() - Span::new().seconds(10));
    app.login_alice().await?;
    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    let round_after = app.client.current_round(auction_id).await?;
    assert_eq!(round_after.extensions_count, 1);
    assert!(round_after.actual_end_time.unwrap() > round_before.actual_end_time.unwrap());

    Ok(())
}

#[tokio::test]
async fn extensions_stop_once_max_extensions_is_reached() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let mut details = test_helpers::basic_auction_details(app.time_source.now());
    details.round_duration_secs = 120;
    details.anti_snipe_window_secs = 30;
    details.anti_snipe_extension_secs = 30;
    details.max_extensions = 1;
    let created = app.client.create_auction(&details).await?;
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await?;
    app.run_scheduler_tick().await?;

    app.login_alice().await?;
    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    // Each increase lands inside the anti-snipe window; only the first
    // should extend the round, since max_extensions is 1.
    for new_amount in [dec!(20), dec!(30), dec!(40)] {
        let round = app.client.current_round(auction_id).await?;
        app.time_source
            .set(round.actual_end_time.unwrap() - Span::new().seconds(5));
        app.client
            .increase_bid(bid.id, &requests::IncreaseBid { new_amount })
            .await?;
    }

    let round = app.client.current_round(auction_id).await?;
    assert_eq!(round.extensions_count, 1);

    Ok(())
}

#[tokio::test]
async fn completing_a_round_ranks_winners_and_carries_over_the_rest() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.register_bob().await?;
    app.register_charlie().await?;

    let mut details = test_helpers::basic_auction_details(app.time_source.now());
    details.total_items = 3;
    details.items_per_round = 1;
    let created = app.client.create_auction(&details).await?;
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await?;
    app.run_scheduler_tick().await?;

    app.login_alice().await?;
    let alice_bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;
    app.login_bob().await?;
    let bob_bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(30) })
        .await?;
    app.login_charlie().await?;
    let charlie_bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(20) })
        .await?;

    let round1 = app.client.current_round(auction_id).await?;
    app.advance_past_round_end(&round1).await;
    app.run_scheduler_tick().await?;

    let auction = app.client.get_auction(auction_id).await?;
    assert_eq!(auction.current_round, 2);

    let bob_with_history = app.client.get_bid(bob_bid.id).await?;
    assert_eq!(bob_with_history.bid.status, BidStatus::Won);
    assert_eq!(bob_with_history.bid.won_position, Some(1));

    let alice_with_history = app.client.get_bid(alice_bid.id).await?;
    assert_eq!(alice_with_history.bid.status, BidStatus::CarriedOver);
    assert_eq!(alice_with_history.bid.current_round, 2);

    let charlie_with_history = app.client.get_bid(charlie_bid.id).await?;
    assert_eq!(charlie_with_history.bid.status, BidStatus::CarriedOver);

    Ok(())
}

#[tokio::test]
async fn the_last_rounds_losing_bids_are_refunded_instead_of_carried_over() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.register_bob().await?;

    let mut details = test_helpers::basic_auction_details(app.time_source.now());
    details.total_items = 1;
    details.items_per_round = 1;
    let created = app.client.create_auction(&details).await?;
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await?;
    app.run_scheduler_tick().await?;

    app.login_alice().await?;
    let alice_bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;
    app.login_bob().await?;
    let bob_bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(20) })
        .await?;

    let round1 = app.client.current_round(auction_id).await?;
    app.advance_past_round_end(&round1).await;
    app.run_scheduler_tick().await?;

    let alice_with_history = app.client.get_bid(alice_bid.id).await?;
    assert_eq!(alice_with_history.bid.status, BidStatus::Refunded);

    let bob_with_history = app.client.get_bid(bob_bid.id).await?;
    assert_eq!(bob_with_history.bid.status, BidStatus::Won);

    let auction = app.client.get_auction(auction_id).await?;
    assert_eq!(auction.status, AuctionStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn round_completion_is_idempotent_across_scheduler_ticks() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await?;
    app.run_scheduler_tick().await?;

    app.login_alice().await?;
    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    let round1 = app.client.current_round(auction_id).await?;
    app.advance_past_round_end(&round1).await;
    app.run_scheduler_tick().await?;
    let after_first_tick = app.client.get_auction(auction_id).await?;
    let bid_after_first_tick = app.client.get_bid(bid.id).await?;

    app.run_scheduler_tick().await?;
    let after_second_tick = app.client.get_auction(auction_id).await?;
    let bid_after_second_tick = app.client.get_bid(bid.id).await?;

    assert_eq!(after_first_tick.current_round, after_second_tick.current_round);
    assert_eq!(bid_after_first_tick.bid.status, bid_after_second_tick.bid.status);
    assert_eq!(
        bid_after_first_tick.history.len(),
        bid_after_second_tick.history.len()
    );

    Ok(())
}
