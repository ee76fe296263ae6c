use clap::Parser;
use weblens_api::{build_router, AppConfig, AppState};

#[derive(Parser)]
#[command(name = "weblens-api")]
#[command(about = "Weblens web-analytics API service")]
struct Args {
    /// Bind address, overrides WEBLENS_BIND
    #[arg(long)]
    bind: Option<String>,

    /// Bootstrap workspace API key, overrides WEBLENS_API_KEY
    #[arg(long, env = "WEBLENS_API_KEY")]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.api_key.is_some() {
        config.bootstrap_api_key = args.api_key;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind,
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        events_per_minute = config.events_per_minute,
        "starting weblens-api"
    );

    let bind = config.bind.clone();
    let state = AppState::new(config).await?;

    // Periodically drop finished insight jobs past their TTL.
    let job_ttl = chrono::Duration::from_std(state.config.job_ttl)?;
    let jobs = state.jobs.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            tick.tick().await;
            let removed = jobs.cleanup(job_ttl);
            if removed > 0 {
                tracing::debug!(removed, "cleaned up finished insight jobs");
            }
        }
    });

    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
