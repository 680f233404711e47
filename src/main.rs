use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assessment_backend::{
    build_router,
    config::{get_config, init_config, StorageBackend},
    database::pool::{create_pool, run_migrations},
    repositories::{MemoryStore, PgStore, Store},
    utils::time::{Clock, SystemClock},
    AppState,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    init_config()?;
    let config = get_config();

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            info!("Using postgres storage");
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app_state = AppState::new(store, clock.clone(), &config.jwt_secret);

    {
        let sweep =
            app_state.sweep_service(chrono::Duration::minutes(config.stale_attempt_minutes));
        let interval = Duration::from_secs(config.sweep_interval_seconds.max(1));
        tokio::spawn(async move {
            loop {
                if let Err(e) = sweep.run_once(clock.now()).await {
                    tracing::error!(error = ?e, "Sweep error");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = build_router(app_state, config.api_rps);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
