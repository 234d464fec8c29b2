use std::sync::Arc;

use anyhow::Result;
use auth::{
    AccountService, JwtConfig, JwtService, UserDirectory,
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::{InMemoryUserRepository, PgUserRepository},
};
use common::{
    broker::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use media::{AttachmentStore, InMemoryAttachmentStore, S3AttachmentStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api::{
    AppState, AppointmentService,
    config::{FeedBackend, ServerConfig, StorageBackend},
    fanout::{FeedPublisher, RedisFeedRelay, SubscriptionBus, local_publisher},
    notifier::{HttpMailNotifier, LogNotifier, Notifier},
    repositories::{AppointmentStore, InMemoryAppointmentStore, PgAppointmentStore},
    routes,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting appointments API service");

    let config = ServerConfig::from_env()?;
    let jwt_service = JwtService::new(JwtConfig::from_env()?)?;

    let (db_pool, users, appointment_store, attachments): (
        _,
        Arc<dyn UserDirectory>,
        Arc<dyn AppointmentStore>,
        Arc<dyn AttachmentStore>,
    ) = match config.storage {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            // Check database connectivity
            if health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }
            run_migrations(&pool).await?;

            (
                Some(pool.clone()),
                Arc::new(PgUserRepository::new(pool.clone())),
                Arc::new(PgAppointmentStore::new(pool)),
                Arc::new(S3AttachmentStore::connect(config.s3_storage()).await),
            )
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, all data is lost on restart");
            (
                None,
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryAppointmentStore::new()),
                Arc::new(InMemoryAttachmentStore::new()),
            )
        }
    };

    let notifier: Arc<dyn Notifier> = match config.mail_relay() {
        Some(relay) => {
            info!("Sending notifications through {}", relay.url);
            Arc::new(HttpMailNotifier::new(relay)?)
        }
        None => {
            info!("No mail relay configured, notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    let bus = SubscriptionBus::new(config.feed_capacity);
    let (publisher, relay_listener): (Arc<dyn FeedPublisher>, _) = match config.feed {
        FeedBackend::Local => (local_publisher(&bus), None),
        FeedBackend::Redis => {
            let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
            if !redis.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }

            let relay = RedisFeedRelay::new(redis);
            let listener = relay.spawn_listener(bus.clone()).await?;
            info!("Appointment feeds relayed through Redis");
            (Arc::new(relay), Some(listener))
        }
    };

    let accounts = AccountService::new(
        Arc::clone(&users),
        jwt_service.clone(),
        RateLimiter::new(RateLimiterConfig::default()),
    );
    let appointments = AppointmentService::new(
        appointment_store,
        users,
        attachments,
        notifier,
        bus,
        publisher,
    )
    .with_upload_options(config.upload_options());

    let app_state = AppState {
        db_pool,
        accounts,
        appointments,
        jwt_service,
        max_upload_bytes: config.max_upload_bytes,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("API service listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(listener) = relay_listener {
        listener.abort();
    }
    info!("API service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received, draining connections");
}
