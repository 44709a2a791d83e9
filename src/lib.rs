pub mod api;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod models;
pub mod repo;
pub mod response;
mod schema;

use axum::{serve::Serve, Router};
use tokio::net::TcpListener;
use tracing::info;

use api::build_app;
use config::Settings;
use database::{create_db_pool, DatabaseBookRepo};

/// Builds the connection pool and binds the listener. The returned future runs the server.
pub async fn start_server(
    settings: &Settings,
) -> std::io::Result<Serve<TcpListener, Router, Router>> {
    let repo = DatabaseBookRepo::new(create_db_pool(&settings.database));

    let router = build_app(repo);

    let listener = TcpListener::bind(settings.bind_address).await?;
    let local_addr = listener.local_addr()?;
    info!("Listening on {}", local_addr);

    Ok(axum::serve(listener, router))
}
