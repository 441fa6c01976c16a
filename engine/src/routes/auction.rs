use actix_identity::Identity;
use actix_web::{HttpResponse, delete, get, post, web};
use payloads::AuctionId;
use sqlx::PgPool;

use crate::routes::{APIError, get_user_id};
use crate::{events::EventBus, store, time::TimeSource};

#[tracing::instrument(skip(pool, time_source), ret)]
#[post("/auctions")]
pub async fn create_auction(
    details: web::Json<payloads::requests::CreateAuction>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let auction = store::auction::create_auction(&details, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[tracing::instrument(skip(pool))]
#[get("/auctions")]
pub async fn list_auctions(
    query: web::Query<payloads::requests::ListAuctions>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let (auctions, total) = store::auction::list_auctions(&query, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::AuctionList {
        auctions,
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(20),
        total,
    }))
}

#[tracing::instrument(skip(pool))]
#[get("/auctions/{auction_id}")]
pub async fn get_auction(
    auction_id: web::Path<AuctionId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let auction = store::auction::get_auction(*auction_id, &pool).await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[tracing::instrument(skip(pool, time_source), ret)]
#[post("/auctions/{auction_id}/start")]
pub async fn start_auction(
    auction_id: web::Path<AuctionId>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    bus: web::Data<EventBus>,
) -> Result<HttpResponse, APIError> {
    let auction =
        store::auction::start_auction(*auction_id, &pool, &time_source, &bus)
            .await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[tracing::instrument(skip(pool, time_source), ret)]
#[delete("/auctions/{auction_id}")]
pub async fn cancel_auction(
    auction_id: web::Path<AuctionId>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    bus: web::Data<EventBus>,
) -> Result<HttpResponse, APIError> {
    let auction =
        store::auction::cancel_auction(*auction_id, &pool, &time_source, &bus)
            .await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[tracing::instrument(skip(pool))]
#[get("/auctions/{auction_id}/current-round")]
pub async fn current_round(
    auction_id: web::Path<AuctionId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let round = store::auction::get_current_round(*auction_id, &pool).await?;
    Ok(HttpResponse::Ok().json(round))
}

#[tracing::instrument(skip(user, pool))]
#[get("/auctions/{auction_id}/rounds/{round_number}/leaderboard")]
pub async fn leaderboard(
    user: Option<Identity>,
    path: web::Path<(AuctionId, i32)>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let (auction_id, round_number) = path.into_inner();
    let current_user = user.as_ref().and_then(|u| get_user_id(u).ok());
    let board = store::bid::get_leaderboard(
        auction_id,
        round_number,
        current_user,
        &pool,
    )
    .await?;
    Ok(HttpResponse::Ok().json(board))
}

#[tracing::instrument(skip(user, pool))]
#[get("/auctions/{auction_id}/my-position")]
pub async fn my_position(
    user: Identity,
    auction_id: web::Path<AuctionId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let position =
        store::bid::get_my_position(*auction_id, user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(position))
}
