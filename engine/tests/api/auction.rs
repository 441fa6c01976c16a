use payloads::{AuctionStatus, requests};
use reqwest::StatusCode;
use rust_decimal::dec;
use test_helpers::{assert_status_code, basic_auction_details, spawn_app};

#[tokio::test]
async fn create_auction_precomputes_one_round_per_item_group() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;

    let mut details = basic_auction_details(app.time_source.now());
    details.total_items = 5;
    details.items_per_round = 2;
    let created = app.client.create_auction(&details).await?;

    assert_eq!(created.auction.total_rounds, 3);
    assert_eq!(created.rounds.len(), 3);
    assert_eq!(created.rounds[0].items_in_round, 2);
    assert_eq!(created.rounds[1].items_in_round, 2);
    assert_eq!(created.rounds[2].items_in_round, 1);
    assert_eq!(created.auction.status, AuctionStatus::Scheduled);

    Ok(())
}

#[tokio::test]
async fn anti_snipe_window_must_be_shorter_than_round_duration() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;

    let mut details = basic_auction_details(app.time_source.now());
    details.round_duration_secs = 60;
    details.anti_snipe_window_secs = 60;
    let result = app.client.create_auction(&details).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn out_of_range_fields_are_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;

    let mut details = basic_auction_details(app.time_source.now());
    details.total_items = 0;
    let result = app.client.create_auction(&details).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn list_auctions_paginates_and_filters_by_status() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;

    for _ in 0..3 {
        app.create_basic_auction().await?;
    }

    let page = app
        .client
        .list_auctions(&requests::ListAuctions {
            status: Some(AuctionStatus::Scheduled),
            page: Some(1),
            limit: Some(2),
        })
        .await?;
    assert_eq!(page.total, 3);
    assert_eq!(page.auctions.len(), 2);
    assert!(page.auctions.iter().all(|a| a.status == AuctionStatus::Scheduled));

    Ok(())
}

#[tokio::test]
async fn manual_start_moves_the_auction_to_active_immediately() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;

    let created = app.create_basic_auction().await?;
    let started = app.client.start_auction(created.auction.id).await?;
    assert_eq!(started.status, AuctionStatus::Active);

    Ok(())
}

#[tokio::test]
async fn starting_an_already_active_auction_conflicts() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;

    let created = app.create_basic_auction().await?;
    app.client.start_auction(created.auction.id).await?;
    let result = app.client.start_auction(created.auction.id).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn cancel_auction_refunds_every_active_bid() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.register_bob().await?;

    let starting_balance = dec!(1000);
    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await?;
    app.run_scheduler_tick().await?;

    app.login_alice().await?;
    let bid_amount = dec!(10);
    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: bid_amount })
        .await?;

    let balance_while_held = app.client.my_balance().await?;
    assert_eq!(balance_while_held.available, starting_balance - bid_amount);

    app.client.cancel_auction(auction_id).await?;

    let balance_after_cancel = app.client.my_balance().await?;
    assert_eq!(balance_after_cancel.available, starting_balance);
    assert_eq!(balance_after_cancel.balance, starting_balance);

    Ok(())
}

#[tokio::test]
async fn get_auction_for_an_unknown_id_is_not_found() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let result = app.client.get_auction(payloads::AuctionId::new()).await;
    assert_status_code(result, StatusCode::NOT_FOUND);
    Ok(())
}
