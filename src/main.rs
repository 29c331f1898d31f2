//! Tweet drop watcher service entrypoint.
//! Boots the axum control surface and the per-chat polling supervisor.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tweet_drop_watcher::bootstrap::ScraperRuntime;
use tweet_drop_watcher::config::ScraperConfig;
use tweet_drop_watcher::create_router;
use tweet_drop_watcher::metrics::Metrics;

/// Compact local logs. Needs a dev environment (debug build or SHUTTLE_ENV in
/// {local, development, dev}) AND SCRAPER_DEV_LOG=1.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("SCRAPER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("poller=info,supervisor=info,notify=info,warn"));

    // A subscriber may already be installed by the runtime.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let cfg = ScraperConfig::load_default()?;
    let runtime = ScraperRuntime::from_config(cfg).await?;
    let metrics = Metrics::init()?;

    runtime.autostart().await;

    let supervisor = runtime.state.supervisor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            supervisor.shutdown().await;
        }
    });

    let router = create_router(runtime.state.clone()).merge(metrics.router());
    Ok(router.into())
}
