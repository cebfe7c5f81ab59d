// main.rs
use std::sync::Arc;

use poem::listener::TcpListener;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::EnvFilter;
use yatube_api::config::Config;
use yatube_api::migration::Migrator;
use yatube_api::{AppState, app, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let db = store::connect(&config.database_url).await?;
    Migrator::up(&db, None).await?;

    let addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(db, config));
    tracing::info!(%addr, "listening");

    poem::Server::new(TcpListener::bind(addr))
        .run(app(state))
        .await?;
    Ok(())
}
