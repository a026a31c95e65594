use std::{net::SocketAddr, path::Path, time::Duration};

use gallery_backend::{app, config::Config, database, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("valid configuration");

    if let Some(parent) = Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .expect("database directory");
        }
    }

    let pool = database::connect(&config.database_url, config.database_pool_size)
        .expect("database pool");
    database::migrate(&pool).await.expect("database migrations");

    let state = AppState::from_config(pool, &config).expect("application state");

    state
        .inner
        .storage
        .init()
        .await
        .expect("uploads directory");

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!("purged {purged} expired admin sessions"),
                Err(e) => tracing::error!("failed to purge admin sessions: {e}"),
            }
        }
    });

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await.expect("bind address");

    tracing::info!("listening on {}", addr);
    tracing::info!("storing uploads in {}", config.uploads_dir.display());

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("start server");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
