//! Ledger operations on a user's balance.
//!
//! Unlike the double-entry journal this module descends from, every
//! operation here touches exactly one user row, so there's no need for
//! deadlock-avoiding lock ordering across accounts. What does carry over is
//! the lock-then-check-then-mutate-then-log discipline: every mutation
//! takes `SELECT ... FOR UPDATE` on the user row inside the caller's
//! transaction, validates the invariant `0 <= reserved <= balance` holds
//! after the write, and appends a `Transaction` row describing what
//! happened.

use jiff_sqlx::ToSqlx;
use payloads::{AuctionId, BidId, TransactionKind, UserId, responses::Transaction};
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres};

use super::{StoreError, User};
use crate::time::TimeSource;

type Tx<'a> = sqlx::Transaction<'a, Postgres>;

/// Lock a user row for update within `tx`. Must be called before any
/// balance-affecting query in the same transaction.
pub async fn get_user_for_update(
    user_id: &UserId,
    tx: &mut Tx<'_>,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::UserNotFound)
}

#[allow(clippy::too_many_arguments)]
async fn apply(
    user: &User,
    kind: TransactionKind,
    amount: Decimal,
    new_balance: Decimal,
    new_reserved: Decimal,
    auction_id: Option<AuctionId>,
    bid_id: Option<BidId>,
    description: &str,
    time_source: &TimeSource,
    tx: &mut Tx<'_>,
) -> Result<(), StoreError> {
    if new_reserved < Decimal::ZERO || new_reserved > new_balance {
        return Err(StoreError::InsufficientBalance {
            available: user.balance - user.reserved,
            amount,
        });
    }

    let now = time_source.now();

    sqlx::query(
        "UPDATE users SET balance = $2, reserved = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(user.id)
    .bind(new_balance)
    .bind(new_reserved)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO transactions (
            user_id, kind, amount, balance_before, balance_after,
            auction_id, bid_id, description, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(user.id)
    .bind(kind)
    .bind(amount)
    .bind(user.balance)
    .bind(new_balance)
    .bind(auction_id)
    .bind(bid_id)
    .bind(description)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Move `amount` from available balance into the reserved pool for a bid.
/// Caller must hold the row lock (via `get_user_for_update`).
pub async fn reserve(
    user: &User,
    amount: Decimal,
    auction_id: AuctionId,
    bid_id: BidId,
    kind: TransactionKind,
    time_source: &TimeSource,
    tx: &mut Tx<'_>,
) -> Result<(), StoreError> {
    let available = user.balance - user.reserved;
    if available < amount {
        return Err(StoreError::InsufficientBalance { available, amount });
    }

    apply(
        user,
        kind,
        -amount,
        user.balance,
        user.reserved + amount,
        Some(auction_id),
        Some(bid_id),
        "bid reservation",
        time_source,
        tx,
    )
    .await
}

/// Release a reservation back to available balance without charging it
/// (outbid, cancelled, or the round ended without a win).
pub async fn refund(
    user: &User,
    amount: Decimal,
    auction_id: AuctionId,
    bid_id: BidId,
    time_source: &TimeSource,
    tx: &mut Tx<'_>,
) -> Result<(), StoreError> {
    apply(
        user,
        TransactionKind::BidRefunded,
        amount,
        user.balance,
        user.reserved - amount,
        Some(auction_id),
        Some(bid_id),
        "bid refunded",
        time_source,
        tx,
    )
    .await
}

/// Convert a reservation into a spent amount on a win: balance and reserved
/// both drop by `amount`.
pub async fn commit_win(
    user: &User,
    amount: Decimal,
    auction_id: AuctionId,
    bid_id: BidId,
    time_source: &TimeSource,
    tx: &mut Tx<'_>,
) -> Result<(), StoreError> {
    apply(
        user,
        TransactionKind::BidWon,
        -amount,
        user.balance - amount,
        user.reserved - amount,
        Some(auction_id),
        Some(bid_id),
        "bid won",
        time_source,
        tx,
    )
    .await?;

    sqlx::query(
        "UPDATE users SET total_wins = total_wins + 1, total_spent = total_spent + $2 WHERE id = $1",
    )
    .bind(user.id)
    .bind(amount)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn deposit(
    user: &User,
    amount: Decimal,
    time_source: &TimeSource,
    tx: &mut Tx<'_>,
) -> Result<(), StoreError> {
    apply(
        user,
        TransactionKind::Deposit,
        amount,
        user.balance + amount,
        user.reserved,
        None,
        None,
        "deposit",
        time_source,
        tx,
    )
    .await
}

pub async fn withdraw(
    user: &User,
    amount: Decimal,
    time_source: &TimeSource,
    tx: &mut Tx<'_>,
) -> Result<(), StoreError> {
    let available = user.balance - user.reserved;
    if available < amount {
        return Err(StoreError::InsufficientBalance { available, amount });
    }

    apply(
        user,
        TransactionKind::Withdrawal,
        -amount,
        user.balance - amount,
        user.reserved,
        None,
        None,
        "withdrawal",
        time_source,
        tx,
    )
    .await
}

pub async fn get_balance(
    user_id: &UserId,
    pool: &sqlx::PgPool,
) -> Result<payloads::responses::Balance, StoreError> {
    let user = super::read_user(pool, user_id).await?;
    Ok(payloads::responses::Balance {
        balance: user.balance,
        reserved: user.reserved,
        available: user.balance - user.reserved,
    })
}

#[derive(FromRow)]
struct TxCount(i64);

pub async fn get_transactions(
    user_id: &UserId,
    page: i64,
    limit: i64,
    pool: &sqlx::PgPool,
) -> Result<(Vec<Transaction>, i64), StoreError> {
    let offset = (page.max(1) - 1) * limit;

    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let TxCount(total) = sqlx::query_as(
        "SELECT COUNT(*) FROM transactions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok((transactions, total))
}
