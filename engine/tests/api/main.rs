mod auction;
mod auth;
mod bid;
mod events;
mod ledger;
mod round;
mod scheduler;

use test_helpers::spawn_app;

#[tokio::test]
async fn health_check_works() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.client.health_check().await?;
    Ok(())
}
