use std::net::SocketAddr;
use std::sync::Arc;

use elaboracrm::config::{Config, StorageBackend};
use elaboracrm::db::{self, Gateway, MemoryGateway, PgGateway};
use elaboracrm::lifecycle::{EngineOptions, LifecycleEngine, SystemClock};
use elaboracrm::{routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elaboracrm=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let gateway: Arc<dyn Gateway> = match config.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(
                &config.database_url,
                config.db_max_connections,
                config.db_acquire_timeout,
            )
            .await?;
            db::run_migrations(pool.as_ref()).await?;
            Arc::new(PgGateway::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryGateway::new())
        }
    };

    let engine = LifecycleEngine::new(
        gateway,
        Arc::new(SystemClock),
        EngineOptions {
            allow_open_acceptance: config.allow_open_acceptance,
        },
    );
    let state = Arc::new(state::AppState {
        engine: Arc::new(engine),
        config: config.clone(),
    });

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("ElaboraCRM listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
