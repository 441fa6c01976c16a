//! `deposit`/`withdraw` have no HTTP route of their own - they're manual
//! balance adjustments, grounded the same way as the teacher's own
//! `store::currency::treasury_credit_operation` is: a Ledger primitive meant
//! for an operator to call directly against the pool, not a bidder-facing
//! endpoint. Exercised here straight against `engine::store::ledger`.

use engine::store;
use engine::time::TimeSource;
use rust_decimal::dec;
use test_helpers::spawn_app;

#[tokio::test]
async fn deposit_then_withdraw_round_trips_the_balance() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let registered = app.register_alice().await?;
    let user_id = registered.user.user_id;
    let time_source = TimeSource::new("2025-01-01T00:00:00Z".parse().unwrap());

    let mut tx = app.db_pool.begin().await?;
    let user = store::ledger::get_user_for_update(&user_id, &mut tx).await?;
    store::ledger::deposit(&user, dec!(500), &time_source, &mut tx).await?;
    tx.commit().await?;

    let after_deposit = app.client.my_balance().await?;
    assert_eq!(after_deposit.balance, dec!(1500));
    assert_eq!(after_deposit.available, dec!(1500));

    let mut tx = app.db_pool.begin().await?;
    let user = store::ledger::get_user_for_update(&user_id, &mut tx).await?;
    store::ledger::withdraw(&user, dec!(200), &time_source, &mut tx).await?;
    tx.commit().await?;

    let after_withdraw = app.client.my_balance().await?;
    assert_eq!(after_withdraw.balance, dec!(1300));
    assert_eq!(app.raw_balance(user_id).await?, dec!(1300));

    Ok(())
}

#[tokio::test]
async fn withdrawing_more_than_available_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let registered = app.register_alice().await?;
    let user_id = registered.user.user_id;
    let time_source = TimeSource::new("2025-01-01T00:00:00Z".parse().unwrap());

    let mut tx = app.db_pool.begin().await?;
    let user = store::ledger::get_user_for_update(&user_id, &mut tx).await?;
    let result = store::ledger::withdraw(&user, dec!(5000), &time_source, &mut tx).await;
    assert!(matches!(
        result,
        Err(store::StoreError::InsufficientBalance { .. })
    ));

    Ok(())
}
