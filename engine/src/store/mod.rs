//! Database store module for the auction engine.
//!
//! ## Design Decisions
//!
//! ### Time Source Dependency
//! - Functions that need current time (`create_auction`, ledger mutations)
//!   accept a `TimeSource` parameter instead of creating their own. This
//!   allows time to be mocked during tests.
//!
//! ### Database Triggers
//! - `updated_at` columns are set explicitly by application code on every
//!   write rather than via a trigger, since several writers (the API and
//!   the scheduler) need to agree on exactly what time was used.
//!
//! ### Type Safety
//! - Every id type implements `sqlx::Type` as a transparent wrapper around
//!   a `Uuid`, so it can be bound directly in queries without touching the
//!   inner value.

use jiff::Timestamp;
use jiff_sqlx::ToSqlx;
use jiff_sqlx::Timestamp as SqlxTs;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use payloads::UserId;

use crate::time::TimeSource;

pub mod auction;
pub mod bid;
pub mod ledger;
pub mod round;

/// A complete user row that stays in the backend; `responses::UserProfile`
/// is the subset of this exposed over the API.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub balance: Decimal,
    pub reserved: Decimal,
    pub total_bids: i64,
    pub total_wins: i64,
    pub total_spent: Decimal,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub updated_at: Timestamp,
}

impl From<User> for payloads::responses::UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            email: user.email,
            balance: user.balance,
            reserved: user.reserved,
            total_bids: user.total_bids,
            total_wins: user.total_wins,
            total_spent: user.total_spent,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found")]
    UserNotFound,
    #[error("Auction not found")]
    AuctionNotFound,
    #[error("Round not found")]
    RoundNotFound,
    #[error("Bid not found")]
    BidNotFound,
    #[error("Username or email already in use")]
    NotUnique(#[source] sqlx::Error),
    #[error(
        "Auction must be in scheduled state to be started, found {found}"
    )]
    AuctionNotScheduled { found: payloads::AuctionStatus },
    #[error("Auction is not active")]
    AuctionNotActive,
    #[error("Round is not active")]
    RoundNotActive,
    #[error("Round is not scheduled; bids can only be cancelled before the round they were placed in starts")]
    RoundNotScheduled,
    #[error(
        "Bid amount {amount} is below the required minimum of {minimum}"
    )]
    BidTooLow { amount: Decimal, minimum: Decimal },
    #[error("User already has an active bid on this auction")]
    AlreadyBidding,
    #[error("Bid is not active")]
    BidNotActive,
    #[error("Bid does not belong to this user")]
    BidNotOwned,
    #[error(
        "Bid was modified concurrently, retry with the latest version"
    )]
    VersionConflict,
    #[error("Insufficient available balance: have {available}, need {amount}")]
    InsufficientBalance { available: Decimal, amount: Decimal },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    #[error("Anti-snipe window must be shorter than the round duration")]
    AntiSnipeWindowTooLong,
    #[error("{0}")]
    InvalidUsername(&'static str),
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Unexpected error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return StoreError::NotUnique(e);
        }
        match e {
            sqlx::Error::RowNotFound => StoreError::UserNotFound,
            e => StoreError::Database(e),
        }
    }
}

/// Create a new user as would happen during signup.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    email: Option<&str>,
    password_hash: &str,
    initial_balance: Decimal,
    time_source: &TimeSource,
) -> Result<User, StoreError> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (
            username, email, password_hash, balance, reserved,
            total_bids, total_wins, total_spent, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, 0, 0, 0, 0, $5, $5)
        RETURNING *;",
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(initial_balance)
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn read_user(pool: &PgPool, id: &UserId) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1;")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => StoreError::UserNotFound,
            e => StoreError::Database(e),
        })
}

/// Fetch `(username, user_id)` for every id in `user_ids`, used to enrich
/// leaderboard rows without one query per row.
pub(crate) async fn get_usernames(
    user_ids: &[UserId],
    pool: &PgPool,
) -> Result<std::collections::HashMap<UserId, String>, StoreError> {
    if user_ids.is_empty() {
        return Ok(std::collections::HashMap::new());
    }

    #[derive(FromRow)]
    struct Row {
        id: UserId,
        username: String,
    }

    let rows: Vec<Row> =
        sqlx::query_as("SELECT id, username FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|r| (r.id, r.username)).collect())
}
