use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scentmatch_api::{
    api::{create_router, AppDependencies, AppState},
    config::Config,
    db::{create_pool, create_redis_client, RedisAnalyticsStore},
    services::{
        clock::{Clock, SystemClock},
        engagement::PostgresActivityRepository,
        providers::{HttpEmbeddingProvider, PostgresCatalog},
        recommendations::GeneratorSettings,
        sessions::{spawn_purge_task, PostgresSessionStore, SessionStore},
        tracking::{EventTracker, PostgresEventSink},
        validation::ValidationLimits,
    },
};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scentmatch_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let db_pool = create_pool(&config.database_url, config.provider_timeout()).await?;
    let redis_client = create_redis_client(&config.redis_url)?;

    let catalog = Arc::new(PostgresCatalog::new(db_pool.clone()));
    let embedding = Arc::new(HttpEmbeddingProvider::new(
        config.embedding_api_key.clone(),
        config.embedding_api_url.clone(),
        config.provider_timeout(),
    )?);

    let sessions: Arc<dyn SessionStore> = Arc::new(PostgresSessionStore::new(
        db_pool.clone(),
        Arc::clone(&clock),
        config.session_retention(),
    ));
    let purge_task = spawn_purge_task(
        Arc::clone(&sessions),
        Arc::clone(&clock),
        SESSION_PURGE_INTERVAL,
    );

    let (tracker, tracker_handle) = EventTracker::start_with_timeout(
        Arc::new(PostgresEventSink::new(db_pool.clone())),
        Arc::clone(&clock),
        config.provider_timeout(),
    );

    let state = AppState::new(AppDependencies {
        limits: ValidationLimits::from(&config),
        settings: GeneratorSettings::from(&config),
        sessions,
        embedding,
        catalog: catalog.clone(),
        index: catalog,
        activity: Arc::new(PostgresActivityRepository::new(db_pool)),
        analytics_store: Arc::new(RedisAnalyticsStore::new(redis_client)),
        tracker,
        clock,
    });

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge_task.abort();
    tracker_handle.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
