use anyhow::Context;
use rater_core::config::{AppConfig, LogConfig, StorageBackend};
use rater_core::traits::DataStorage;
use rater_services::{Engine, KeyedGuard, Scheduler};
use rater_store::{MapStorage, RedisStorage};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting rater");

    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on exit");
            run(Arc::new(MapStorage::new()), config).await
        }
        StorageBackend::Redis => {
            let storage = RedisStorage::new(&config.storage.redis_url)
                .await
                .context("Failed to connect to Redis")?;
            storage.ping().await.context("Redis ping failed")?;
            info!("Redis storage connected");
            run(Arc::new(storage), config).await
        }
    }
}

async fn run<S: DataStorage + 'static>(storage: Arc<S>, config: AppConfig) -> anyhow::Result<()> {
    let guard = Arc::new(KeyedGuard::new());
    let engine = Arc::new(Engine::new(storage, guard, config.rating.clone()));

    if !config.scheduler.enabled {
        info!("Scheduler disabled");
        tokio::signal::ctrl_c().await.context("Failed to listen for shutdown")?;
        info!("Shutting down");
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new(engine, config.scheduler.clone()));
    let loaded = scheduler.reload(true).await.context("Failed to load action timings")?;
    info!("Scheduler armed with {} timings", loaded);

    #[cfg(unix)]
    spawn_reload_on_hangup(scheduler.clone())?;

    let handle = tokio::spawn(scheduler.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown: {}", e);
        }
        info!("Shutting down");
    }));
    handle.await.context("Scheduler task failed")?;
    Ok(())
}

/// Rebuilds the scheduler queue from storage on every SIGHUP
#[cfg(unix)]
fn spawn_reload_on_hangup<S: DataStorage + 'static>(scheduler: Arc<Scheduler<S>>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match scheduler.reload(true).await {
                Ok(loaded) => info!("Reloaded {} action timings", loaded),
                Err(e) => error!("Action timing reload failed: {}", e),
            }
        }
    });
    Ok(())
}
