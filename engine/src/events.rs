//! In-process event bus: one broadcast channel per auction ("room"), plus a
//! direct channel per user for events like `user:won` that aren't meant for
//! the whole room. Publication always happens after the producing
//! transaction commits; a failed publish is logged and never rolls back the
//! write that produced it.

use std::collections::HashMap;
use std::sync::Mutex;

use payloads::{AuctionId, UserId, events::Event};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const ROOM_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct EventBus {
    rooms: Mutex<HashMap<AuctionId, broadcast::Sender<Event>>>,
    direct: Mutex<HashMap<UserId, broadcast::Sender<Event>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            direct: Mutex::new(HashMap::new()),
        }
    }

    fn room_sender(&self, auction_id: AuctionId) -> broadcast::Sender<Event> {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(auction_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    fn direct_sender(&self, user_id: UserId) -> broadcast::Sender<Event> {
        let mut direct = self.direct.lock().unwrap();
        direct
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    /// Publish to the event's auction room, and additionally to its direct
    /// recipient if it has one. Subscriber count of zero is not an error:
    /// the room simply has nobody listening right now.
    #[tracing::instrument(skip(self, event))]
    pub fn publish(&self, event: Event) {
        let auction_id = event.auction_id();
        let _ = self.room_sender(auction_id).send(event.clone());
        if let Some(user_id) = event.direct_recipient() {
            let _ = self.direct_sender(user_id).send(event);
        }
    }

    pub fn subscribe_room(&self, auction_id: AuctionId) -> BroadcastStream<Event> {
        BroadcastStream::new(self.room_sender(auction_id).subscribe())
    }

    pub fn subscribe_user(&self, user_id: UserId) -> BroadcastStream<Event> {
        BroadcastStream::new(self.direct_sender(user_id).subscribe())
    }
}
