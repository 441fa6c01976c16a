use actix_identity::Identity;
use actix_web::{HttpResponse, delete, get, post, put, web};
use payloads::BidId;
use sqlx::PgPool;

use crate::routes::{APIError, get_user_id};
use crate::{events::EventBus, store, time::TimeSource};

#[tracing::instrument(skip(user, pool, time_source), ret)]
#[post("/bids")]
pub async fn place_bid(
    user: Identity,
    details: web::Json<payloads::requests::PlaceBid>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    bus: web::Data<EventBus>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let bid = store::bid::place_bid(
        user_id,
        details.auction_id,
        details.amount,
        &pool,
        &time_source,
        &bus,
    )
    .await?;
    Ok(HttpResponse::Ok().json(bid))
}

#[tracing::instrument(skip(user, pool, time_source), ret)]
#[put("/bids/{bid_id}")]
pub async fn increase_bid(
    user: Identity,
    bid_id: web::Path<BidId>,
    details: web::Json<payloads::requests::IncreaseBid>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    bus: web::Data<EventBus>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let bid = store::bid::increase_bid(
        *bid_id,
        user_id,
        details.new_amount,
        &pool,
        &time_source,
        &bus,
    )
    .await?;
    Ok(HttpResponse::Ok().json(bid))
}

#[tracing::instrument(skip(user, pool, time_source), ret)]
#[delete("/bids/{bid_id}")]
pub async fn cancel_bid(
    user: Identity,
    bid_id: web::Path<BidId>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    bus: web::Data<EventBus>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::bid::cancel_bid(*bid_id, user_id, &pool, &time_source, &bus).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(skip(user, pool))]
#[get("/bids/{bid_id}")]
pub async fn get_bid(
    user: Identity,
    bid_id: web::Path<BidId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    get_user_id(&user)?;
    let bid = store::bid::get_bid_with_history(*bid_id, &pool).await?;
    Ok(HttpResponse::Ok().json(bid))
}

#[tracing::instrument(skip(user, pool))]
#[get("/users/me/balance")]
pub async fn my_balance(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let balance = store::ledger::get_balance(&user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(balance))
}

#[tracing::instrument(skip(user, pool))]
#[get("/users/me/transactions")]
pub async fn my_transactions(
    user: Identity,
    query: web::Query<payloads::requests::ListTransactions>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);
    let (transactions, total) =
        store::ledger::get_transactions(&user_id, page, limit, &pool).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::TransactionList {
        transactions,
        page,
        limit,
        total,
    }))
}
