//! The event bus is exercised here directly rather than over the `/api/events`
//! SSE endpoint: asserting on a streaming HTTP response needs a `reqwest`
//! build with the `stream` feature enabled, which nothing else in this crate
//! needs, so the room/direct-routing behavior is tested at the bus level
//! instead.

use engine::events::EventBus;
use payloads::{AuctionId, UserId, events::Event};
use rust_decimal::dec;
use tokio_stream::StreamExt;

#[tokio::test]
async fn a_room_event_reaches_every_subscriber_of_that_auction() {
    let bus = EventBus::new();
    let auction_id = AuctionId::new();
    let other_auction_id = AuctionId::new();

    let mut subscriber = bus.subscribe_room(auction_id);
    let mut other_room_subscriber = bus.subscribe_room(other_auction_id);

    bus.publish(Event::RoundStarted {
        auction_id,
        round_number: 1,
        items_in_round: 1,
        scheduled_end_time: jiff::Timestamp::now(),
    });

    let received = subscriber.next().await.unwrap().unwrap();
    assert_eq!(received.auction_id(), auction_id);

    let timeout = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        other_room_subscriber.next(),
    )
    .await;
    assert!(timeout.is_err(), "a different auction's room should not see the event");
}

#[tokio::test]
async fn a_user_won_event_is_also_delivered_directly_to_the_winner() {
    let bus = EventBus::new();
    let auction_id = AuctionId::new();
    let winner = UserId::new();
    let bystander = UserId::new();

    let mut winner_direct = bus.subscribe_user(winner);
    let mut bystander_direct = bus.subscribe_user(bystander);
    let mut room = bus.subscribe_room(auction_id);

    bus.publish(Event::UserWon {
        auction_id,
        user_id: winner,
        item_number: 1,
        amount: dec!(42),
        round_number: 1,
    });

    let via_room = room.next().await.unwrap().unwrap();
    assert!(matches!(via_room, Event::UserWon { user_id, .. } if user_id == winner));

    let via_direct = winner_direct.next().await.unwrap().unwrap();
    assert!(matches!(via_direct, Event::UserWon { user_id, .. } if user_id == winner));

    let bystander_timeout = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        bystander_direct.next(),
    )
    .await;
    assert!(bystander_timeout.is_err());
}

#[tokio::test]
async fn events_without_a_direct_recipient_are_room_only() {
    let event = Event::LeaderboardUpdated {
        auction_id: AuctionId::new(),
        round_number: 1,
        ts: jiff::Timestamp::now(),
    };
    assert_eq!(event.direct_recipient(), None);
}
