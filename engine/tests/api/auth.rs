use reqwest::StatusCode;
use test_helpers::{alice_credentials, alice_login, assert_status_code, spawn_app};

#[tokio::test]
async fn register_then_login_round_trips_the_profile() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let registered = app.register_alice().await?;
    assert_eq!(registered.user.username, "alice");
    assert_eq!(registered.user.balance, rust_decimal::dec!(1000));

    app.login_alice().await?;
    let me = app.client.me().await?;
    assert_eq!(me.username, "alice");

    Ok(())
}

#[tokio::test]
async fn registering_with_an_invalid_username_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let mut details = alice_credentials();
    details.username = "ab".into();
    let result = app.client.register(&details).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn registering_the_same_username_twice_conflicts() -> anyhow::Result<()> {
    let app = spawn_app().await;

    app.register_alice().await?;
    let result = app.client.register(&alice_credentials()).await;
    assert_status_code(result, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;

    let mut bad_login = alice_login();
    bad_login.password = "not-the-password".into();
    let result = app.client.login(&bad_login).await;
    assert_status_code(result, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn me_without_a_session_is_unauthorized() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let result = app.client.me().await;
    assert_status_code(result, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.register_alice().await?;
    app.login_alice().await?;
    app.client.me().await?;

    app.client.logout().await?;
    let result = app.client.me().await;
    assert_status_code(result, StatusCode::UNAUTHORIZED);

    Ok(())
}
