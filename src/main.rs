use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use rental_booking_api as api;
use api::{
    circuit_breaker::CircuitBreakerConfig,
    config::AppConfig,
    message_queue::{InMemoryMessageQueue, MessageQueue, RedisMessageQueue},
    notifications::{
        channels::{DisabledChannel, EmailChannel, HttpEmailChannel, SmsChannel, TwilioSmsChannel},
        delivery::DeliverySettings,
        scheduler::ReminderScheduler,
        DirectSender, NotificationDispatcher, NotificationSender, QueueSender,
    },
    services::payments::{PaymentGateway, StripeGateway, UnconfiguredGateway},
};

const WORKER_IDLE_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Redis is only needed for the redis queue backend and webhook de-duplication
    let redis_client = if cfg.message_queue_backend.eq_ignore_ascii_case("redis") {
        Some(Arc::new(
            redis::Client::open(cfg.redis_url.clone()).context("invalid redis url")?,
        ))
    } else {
        None
    };
    let message_queue = build_message_queue(&cfg, redis_client.as_deref()).await;

    // Notification tiers: queue first, direct delivery when the queue is down
    let direct: Arc<dyn NotificationSender> = Arc::new(DirectSender::new(
        db_arc.clone(),
        email_channel(&cfg)?,
        sms_channel(&cfg)?,
        DeliverySettings {
            site_name: cfg.site_name.clone(),
            public_base_url: cfg.public_base_url.clone(),
            default_country_code: cfg.sms_default_country_code.clone(),
        },
    ));
    let notifier = NotificationDispatcher::new(
        Arc::new(QueueSender::new(message_queue.clone())),
        direct.clone(),
        CircuitBreakerConfig {
            failure_threshold: cfg.circuit_breaker_failure_threshold,
            timeout: Duration::from_secs(cfg.circuit_breaker_timeout_secs),
            success_threshold: 1,
        },
    );
    tokio::spawn(api::notifications::run_worker(
        message_queue,
        direct,
        WORKER_IDLE_DELAY,
    ));

    let gateway: Arc<dyn PaymentGateway> = match cfg.stripe_secret_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            Arc::new(StripeGateway::new(cfg.stripe_api_base.clone(), key)?)
        }
        _ => {
            warn!("stripe_secret_key not set; checkout payments will fail");
            Arc::new(UnconfiguredGateway)
        }
    };

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::build(
        db_arc.clone(),
        &cfg,
        event_sender,
        gateway,
        notifier.clone(),
        redis_client.clone(),
    )
    .await
    .context("failed to build services")?;

    if cfg.scheduler_enabled {
        let scheduler = ReminderScheduler::new(
            services.bookings.clone(),
            services.checkout.clone(),
            notifier,
            cfg.reminder_hour,
        );
        tokio::spawn(scheduler.run());
    } else {
        info!("reminder scheduler disabled");
    }

    let auth_service = Arc::new(api::auth::AuthService::new(
        api::auth::AuthConfig::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        ),
        services.staff.clone(),
    ));

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        services,
        redis: redis_client,
    };

    let app = api::app_router(app_state, auth_service)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&cfg)?);

    // Bind and serve
    let host: std::net::IpAddr = cfg.host.parse().context("invalid host address")?;
    let addr = SocketAddr::from((host, cfg.port));
    info!("rental-booking-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_message_queue(
    cfg: &AppConfig,
    redis_client: Option<&redis::Client>,
) -> Arc<dyn MessageQueue> {
    let Some(client) = redis_client else {
        return Arc::new(InMemoryMessageQueue::new());
    };
    match RedisMessageQueue::connect(
        client,
        cfg.message_queue_namespace.clone(),
        Duration::from_secs(cfg.message_queue_block_timeout_secs),
    )
    .await
    {
        Ok(queue) => Arc::new(queue),
        Err(err) => {
            error!(
                "Failed to initialize Redis message queue (falling back to in-memory): {}",
                err
            );
            Arc::new(InMemoryMessageQueue::new())
        }
    }
}

fn email_channel(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EmailChannel>> {
    match (&cfg.email_api_url, &cfg.email_api_key) {
        (Some(url), Some(key)) if cfg.email_configured() => Ok(Arc::new(HttpEmailChannel::new(
            url.clone(),
            key.clone(),
            cfg.email_from_address.clone(),
        )?)),
        _ => {
            warn!("email provider not configured; emails will not be sent");
            Ok(Arc::new(DisabledChannel::new("email")))
        }
    }
}

fn sms_channel(cfg: &AppConfig) -> anyhow::Result<Arc<dyn SmsChannel>> {
    match (&cfg.sms_account_sid, &cfg.sms_auth_token, &cfg.sms_from_number) {
        (Some(sid), Some(token), Some(from)) if cfg.sms_configured() => {
            Ok(Arc::new(TwilioSmsChannel::new(
                cfg.sms_api_base.clone(),
                sid.clone(),
                token.clone(),
                from.clone(),
            )?))
        }
        _ => {
            warn!("sms provider not configured; text messages will not be sent");
            Ok(Arc::new(DisabledChannel::new("sms")))
        }
    }
}

fn cors_layer(cfg: &AppConfig) -> anyhow::Result<CorsLayer> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials))
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        anyhow::bail!(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
        )
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
