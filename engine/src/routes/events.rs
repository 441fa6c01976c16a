use actix_identity::Identity;
use actix_web::{HttpResponse, get, web};
use payloads::AuctionId;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::events::EventBus;
use crate::routes::{APIError, get_user_id};

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    auction_id: AuctionId,
}

/// Subscribe to an auction's event room over Server-Sent Events. One
/// connecting request stands in for the `subscribe:auction(id)` message a
/// bidirectional socket would otherwise carry.
#[tracing::instrument(skip(user, bus))]
#[get("/events")]
pub async fn subscribe(
    user: Identity,
    query: web::Query<EventsQuery>,
    bus: web::Data<EventBus>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;

    let room = bus.subscribe_room(query.auction_id);
    let direct = bus.subscribe_user(user_id);
    let stream = room.merge(direct).map(to_sse_frame);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream.map(Ok::<_, actix_web::Error>)))
}

fn to_sse_frame(
    item: Result<payloads::events::Event, tokio_stream::wrappers::errors::BroadcastStreamRecvError>,
) -> web::Bytes {
    match item {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => web::Bytes::from(format!("data: {json}\n\n")),
            Err(_) => web::Bytes::new(),
        },
        Err(_lagged) => web::Bytes::new(),
    }
}
