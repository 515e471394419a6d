use std::sync::Arc;

use staffing_backend::{
    build_router,
    utils::{config::Config, database::create_pool},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "staffing_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = create_pool(&config.database_url, config.max_connections).await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        db,
        config: Arc::new(config),
    };

    let app = build_router(state)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
