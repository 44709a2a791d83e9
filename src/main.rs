use anyhow::Context;
use tracing_subscriber::EnvFilter;

use book_catalog_api::{config::Settings, start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let settings = Settings::from_env().context("failed to load settings")?;

    let server = start_server(&settings)
        .await
        .context("failed to start server")?;

    server.await.context("server error")?;

    Ok(())
}
