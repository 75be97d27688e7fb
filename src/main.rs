//! Storefront orders service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_orders::api::{self, AppState};
use storefront_orders::identity::{IdentityProvider, PgIdentityProvider, StaticIdentityProvider};
use storefront_orders::store::{MemoryOrderStore, OrderStore, PgOrderStore};
use storefront_orders::{Config, OrderService};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let (store, identity): (Arc<dyn OrderStore>, Arc<dyn IdentityProvider>) = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            (Arc::new(PgOrderStore::new(db.clone())), Arc::new(PgIdentityProvider::new(db)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory and lost on restart");
            (Arc::new(MemoryOrderStore::new()), Arc::new(StaticIdentityProvider::new(config.static_tokens.clone())))
        }
    };

    let state = AppState { service: Arc::new(OrderService::new(store, config.pricing.clone())), identity };
    let app = api::router(state);

    tracing::info!("storefront orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
