use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use api::{AppState, Config};
use approvals::HandlerRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into())
        )
        .init();

    info!("Starting Warden API");

    let config = Config::from_env();
    let pool = PgPool::connect(&config.database_url).await?;
    storage::initialize_schema(&pool).await?;
    info!("Database schema ready");

    // Service adapters (Gmail, Binance, ...) register here as they are
    // integrated; an unregistered pair fails the action explicitly.
    let handlers = Arc::new(HandlerRegistry::new());

    let addr = config.socket_addr()?;
    let state = AppState::build(config, pool, handlers);
    let app = api::routes::create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
