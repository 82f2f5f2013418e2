use anyhow::Context;
use payorder_store::{app_config::Config, DbClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payorder_store=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(database = %config.database.url, "Applying payment order schema");

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Migration failed")?;

    // reject a malformed secret list before anything signs
    config
        .signature
        .slot_secrets()
        .context("Invalid signature configuration")?;

    Ok(())
}
