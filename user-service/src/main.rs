use service_core::error::AppError;
use service_core::middleware::create_ip_rate_limiter;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use user_service::{
    build_router,
    config::UserServiceConfig,
    services::{
        spawn_purge_task, AuthService, InMemoryBlacklist, InMemoryUserStore, JwtService,
        PgUserStore, RedisBlacklist, TokenBlacklist, UserService, UserStore,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = UserServiceConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting user service"
    );

    let users: Arc<dyn UserStore> = match &config.database.url {
        Some(url) => {
            let store = PgUserStore::connect(
                url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await
            .map_err(AppError::DatabaseError)?;
            store.run_migrations().await.map_err(AppError::DatabaseError)?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory user store");
            Arc::new(InMemoryUserStore::new())
        }
    };

    let shutdown_token = CancellationToken::new();

    let blacklist: Arc<dyn TokenBlacklist> = match &config.redis.url {
        Some(url) => Arc::new(RedisBlacklist::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory token blacklist");
            let store: Arc<dyn TokenBlacklist> = Arc::new(InMemoryBlacklist::new());
            spawn_purge_task(
                store.clone(),
                Duration::from_secs(config.redis.purge_interval_seconds),
                shutdown_token.clone(),
            );
            store
        }
    };

    let jwt = JwtService::from_config(&config.jwt).map_err(AppError::ConfigError)?;

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let register_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.register_attempts,
        config.rate_limit.register_window_seconds,
    );

    let auth_service = AuthService::new(users.clone(), blacklist.clone(), jwt);
    let user_service = UserService::new(users.clone());

    if let Some(admin) = &config.admin {
        user_service.ensure_admin(admin).await?;
    }

    let state = AppState {
        config: config.clone(),
        auth_service,
        user_service,
        users,
        blacklist,
        login_rate_limiter,
        register_rate_limiter,
    };
    let app = build_router(state);

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token))
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    shutdown_token.cancel();
}
