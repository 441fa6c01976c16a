use payloads::{BidStatus, TransactionKind, requests};
use reqwest::StatusCode;
use rust_decimal::dec;
use test_helpers::{assert_status_code, spawn_app};

async fn spawn_with_active_auction() -> (test_helpers::TestApp, payloads::AuctionId) {
    let app = spawn_app().await;
    app.register_alice().await.unwrap();
    app.register_bob().await.unwrap();

    let created = app.create_basic_auction().await.unwrap();
    let auction_id = created.auction.id;
    app.client.start_auction(auction_id).await.unwrap();
    app.run_scheduler_tick().await.unwrap();

    (app, auction_id)
}

#[tokio::test]
async fn placing_a_bid_reserves_the_amount() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;
    assert_eq!(bid.status, BidStatus::Active);

    let balance = app.client.my_balance().await?;
    assert_eq!(balance.reserved, dec!(10));
    assert_eq!(balance.available, balance.balance - dec!(10));

    Ok(())
}

#[tokio::test]
async fn a_user_can_only_have_one_active_bid_per_auction() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;
    let result = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(20) })
        .await;
    assert_status_code(result, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn bids_below_the_auction_minimum_are_rejected() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    let result = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(1) })
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn increasing_a_bid_below_the_step_minimum_is_rejected() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(100) })
        .await?;

    // min_bid_step_percent is 5 on the basic auction, so 101 is too low.
    let result = app
        .client
        .increase_bid(bid.id, &requests::IncreaseBid { new_amount: dec!(101) })
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    let increased = app
        .client
        .increase_bid(bid.id, &requests::IncreaseBid { new_amount: dec!(110) })
        .await?;
    assert_eq!(increased.amount, dec!(110));
    assert_eq!(increased.version, bid.version + 1);

    Ok(())
}

#[tokio::test]
async fn increasing_a_bid_reserves_only_the_delta() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(100) })
        .await?;
    app.client
        .increase_bid(bid.id, &requests::IncreaseBid { new_amount: dec!(150) })
        .await?;

    let balance = app.client.my_balance().await?;
    assert_eq!(balance.reserved, dec!(150));

    Ok(())
}

#[tokio::test]
async fn cancelling_a_bid_in_an_active_round_is_rejected() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;
    let result = app.client.cancel_bid(bid.id).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn cancelling_a_bid_while_scheduled_refunds_the_reservation() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let created = app.create_basic_auction().await?;
    let auction_id = created.auction.id;

    app.login_alice().await?;
    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    let balance_while_held = app.client.my_balance().await?;
    assert_eq!(balance_while_held.reserved, dec!(10));

    app.client.cancel_bid(bid.id).await?;

    let balance_after = app.client.my_balance().await?;
    assert_eq!(balance_after.reserved, dec!(0));

    let with_history = app.client.get_bid(bid.id).await?;
    assert_eq!(with_history.bid.status, BidStatus::Refunded);
    assert_eq!(with_history.history.len(), 2);

    Ok(())
}

#[tokio::test]
async fn a_bid_cannot_be_increased_by_another_user() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;
    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    app.login_bob().await?;
    let result = app
        .client
        .increase_bid(bid.id, &requests::IncreaseBid { new_amount: dec!(20) })
        .await;
    assert_status_code(result, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn leaderboard_ranks_by_amount_then_by_earliest_bid() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;

    app.login_alice().await?;
    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    app.login_bob().await?;
    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(20) })
        .await?;

    let board = app.client.leaderboard(auction_id, 1).await?;
    assert_eq!(board.entries.len(), 2);
    assert_eq!(board.entries[0].username, "bob");
    assert_eq!(board.entries[0].position, 1);
    assert_eq!(board.entries[1].username, "alice");

    Ok(())
}

#[tokio::test]
async fn my_transactions_lists_reservations_newest_first() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;
    app.login_alice().await?;

    let bid = app
        .client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;
    app.client
        .increase_bid(bid.id, &requests::IncreaseBid { new_amount: dec!(20) })
        .await?;

    let page = app
        .client
        .my_transactions(&requests::ListTransactions { page: None, limit: None })
        .await?;
    assert_eq!(page.total, 2);
    assert_eq!(page.transactions.len(), 2);
    // Newest first: the increase's reservation comes before the initial bid's.
    assert_eq!(page.transactions[0].kind, TransactionKind::BidIncreased);
    assert_eq!(page.transactions[0].amount, dec!(-10));
    assert_eq!(page.transactions[1].kind, TransactionKind::BidPlaced);
    assert_eq!(page.transactions[1].amount, dec!(-10));

    Ok(())
}

#[tokio::test]
async fn my_position_reports_whether_the_current_bid_is_winning() -> anyhow::Result<()> {
    let (app, auction_id) = spawn_with_active_auction().await;

    app.login_alice().await?;
    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(10) })
        .await?;

    app.login_bob().await?;
    app.client
        .place_bid(&requests::PlaceBid { auction_id, amount: dec!(20) })
        .await?;

    app.login_alice().await?;
    let alice_position = app.client.my_position(auction_id).await?;
    // basic_auction_details sets items_per_round to 1, so only the top bid wins.
    assert_eq!(alice_position.position, 2);
    assert!(!alice_position.is_winning);

    Ok(())
}
