//! Wire types shared between the engine and its clients.
//!
//! Id newtypes keep different tables' primary keys from being mixed up at
//! the type level. `use-sqlx` lets the same types be decoded straight out of
//! Postgres rows inside the engine crate, and turned off for the plain
//! `reqwest`-based client that has no business depending on `sqlx`.

pub mod api_client;
pub mod events;
pub mod requests;
pub mod responses;

use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Display,
            Serialize,
            Deserialize,
        )]
        #[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

id_type!(UserId);
id_type!(AuctionId);
id_type!(RoundId);
id_type!(BidId);
id_type!(TransactionId);
id_type!(WonItemId);
id_type!(BidHistoryEntryId);

/// Lifecycle of an auction created via [`crate::requests::CreateAuction`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(type_name = "auction_status", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(type_name = "round_status", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Scheduled,
    Active,
    Completed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(type_name = "bid_status", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Active,
    CarriedOver,
    Won,
    Refunded,
    Outbid,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(type_name = "bid_history_action", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BidHistoryAction {
    Created,
    Increased,
    CarriedOver,
    Won,
    Refunded,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(type_name = "transaction_kind", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    BidPlaced,
    BidIncreased,
    BidWon,
    BidRefunded,
    AdminAdjustment,
}

/// User identification bundled with display information, the standard way
/// to reference a user in an API response without leaking their balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub username: String,
}

/// One entry in a bid's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct BidHistoryEntry {
    pub action: BidHistoryAction,
    pub amount: Decimal,
    pub round_number: i32,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "jiff_sqlx::Timestamp"))]
    pub created_at: jiff::Timestamp,
    pub prev_amount: Option<Decimal>,
}

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameValidation {
    Valid,
    TooShort,
    TooLong,
    InvalidCharacters,
}

impl UsernameValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::TooShort => Some("Username must be at least 3 characters"),
            Self::TooLong => Some("Username must be at most 50 characters"),
            Self::InvalidCharacters => Some(
                "Username may only contain letters, numbers, underscores, and hyphens",
            ),
        }
    }
}

/// Validate a username: 3-50 chars, `[A-Za-z0-9_-]`.
pub fn validate_username(username: &str) -> UsernameValidation {
    if username.len() < USERNAME_MIN_LEN {
        return UsernameValidation::TooShort;
    }
    if username.len() > USERNAME_MAX_LEN {
        return UsernameValidation::TooLong;
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return UsernameValidation::InvalidCharacters;
    }
    UsernameValidation::Valid
}

/// Decode helper for nullable timestamp columns: `jiff_sqlx::Timestamp` only
/// implements `From`/`Into` for `jiff::Timestamp` itself, not for
/// `Option<jiff::Timestamp>`, so `sqlx(try_from = "Option<SqlxTs>")` can't
/// satisfy the derive's `TryFrom` bound directly. This local wrapper gives
/// the orphan-rule-compliant `TryFrom` impl the derive needs.
#[cfg(feature = "use-sqlx")]
pub struct OptionalTimestamp(pub Option<jiff_sqlx::Timestamp>);

#[cfg(feature = "use-sqlx")]
impl<DB> sqlx::Type<DB> for OptionalTimestamp
where
    DB: sqlx::Database,
    Option<jiff_sqlx::Timestamp>: sqlx::Type<DB>,
{
    fn type_info() -> DB::TypeInfo {
        <Option<jiff_sqlx::Timestamp> as sqlx::Type<DB>>::type_info()
    }
}

#[cfg(feature = "use-sqlx")]
impl<'r, DB> sqlx::Decode<'r, DB> for OptionalTimestamp
where
    DB: sqlx::Database,
    Option<jiff_sqlx::Timestamp>: sqlx::Decode<'r, DB>,
{
    fn decode(
        value: <DB as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(OptionalTimestamp(
            <Option<jiff_sqlx::Timestamp> as sqlx::Decode<DB>>::decode(value)?,
        ))
    }
}

#[cfg(feature = "use-sqlx")]
impl TryFrom<OptionalTimestamp> for Option<jiff::Timestamp> {
    type Error = std::convert::Infallible;

    fn try_from(value: OptionalTimestamp) -> Result<Self, Self::Error> {
        Ok(value.0.map(Into::into))
    }
}
