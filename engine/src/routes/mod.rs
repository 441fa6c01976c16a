pub mod auction;
pub mod auth;
pub mod bid;
pub mod events;

use actix_identity::Identity;
use actix_web::{
    HttpResponse, Responder, ResponseError, body::BoxBody,
    dev::HttpServiceFactory, get, web,
};
use uuid::Uuid;

use crate::store::StoreError;

pub fn api_services() -> impl HttpServiceFactory {
    web::scope("/api")
        .service(health_check)
        .service(auth::register)
        .service(auth::login)
        .service(auth::logout)
        .service(auth::me)
        .service(auction::create_auction)
        .service(auction::list_auctions)
        .service(auction::get_auction)
        .service(auction::start_auction)
        .service(auction::cancel_auction)
        .service(auction::current_round)
        .service(auction::leaderboard)
        .service(auction::my_position)
        .service(bid::place_bid)
        .service(bid::increase_bid)
        .service(bid::cancel_bid)
        .service(bid::get_bid)
        .service(bid::my_balance)
        .service(bid::my_transactions)
        .service(events::subscribe)
}

#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Authentication failed")]
    AuthError(#[source] anyhow::Error),
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error("Not found")]
    NotFound(#[source] anyhow::Error),
    #[error("Conflict")]
    Conflict(#[source] anyhow::Error),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::AuthError(e) => {
                HttpResponse::Unauthorized().body(format!("{self}: {e}"))
            }
            Self::BadRequest(e) => {
                HttpResponse::BadRequest().body(format!("{self}: {e}"))
            }
            Self::NotFound(e) => HttpResponse::NotFound().body(format!("{self}: {e}")),
            Self::Conflict(e) => HttpResponse::Conflict().body(format!("{self}: {e}")),
            Self::UnexpectedError(_) => {
                HttpResponse::InternalServerError().body(self.to_string())
            }
        }
    }
}

impl From<StoreError> for APIError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(_) | StoreError::UnexpectedError(_) => {
                APIError::UnexpectedError(e.into())
            }
            StoreError::UserNotFound
            | StoreError::AuctionNotFound
            | StoreError::RoundNotFound
            | StoreError::BidNotFound => APIError::NotFound(e.into()),
            StoreError::NotUnique(_)
            | StoreError::VersionConflict
            | StoreError::AlreadyBidding => APIError::Conflict(e.into()),
            StoreError::AuctionNotScheduled { .. }
            | StoreError::AuctionNotActive
            | StoreError::RoundNotActive
            | StoreError::RoundNotScheduled
            | StoreError::BidTooLow { .. }
            | StoreError::BidNotActive
            | StoreError::InsufficientBalance { .. }
            | StoreError::OutOfRange { .. }
            | StoreError::AntiSnipeWindowTooLong
            | StoreError::InvalidUsername(_) => APIError::BadRequest(e.into()),
            StoreError::BidNotOwned => APIError::AuthError(e.into()),
        }
    }
}

fn get_user_id(user: &Identity) -> Result<payloads::UserId, APIError> {
    let id_str = user.id().map_err(|e| {
        APIError::AuthError(
            anyhow::Error::from(e).context("Invalid login session"),
        )
    })?;
    // special case: since this is used in so many routes, the user_id is
    // recorded here, but attaches to the span for the api route itself
    tracing::Span::current()
        .record("user_id", tracing::field::display(&id_str));
    Ok(payloads::UserId(
        Uuid::parse_str(&id_str).map_err(anyhow::Error::from)?,
    ))
}
