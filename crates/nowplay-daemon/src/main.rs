mod backoff;
mod clock;
mod estimator;
mod fetch;
mod http;
mod poller;
mod reconcile;

use clock::{Clock, SystemClock};
use nowplay_proto::config::Config;
use nowplay_proto::snapshot::SnapshotStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging under the data dir, level via RUST_LOG
    let data_dir = nowplay_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nowplay_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let token = config.resolve_token();
    if token.is_none() {
        warn!("no upstream token configured — polls will report unauthorized until one is set");
    }

    let store = SnapshotStore::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cancel = CancellationToken::new();

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            store.clone(),
        );
    }

    let estimator_handle = tokio::spawn(estimator::run(
        store.clone(),
        clock.clone(),
        cancel.clone(),
    ));

    let client = fetch::UpstreamClient::new(config.upstream.api_base.clone(), token);
    let poller = poller::Poller::new(client, store, clock, config.poll.clone());
    let poller_handle = tokio::spawn(poller.run(cancel.clone()));

    info!("Daemon initialised, polling upstream");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    cancel.cancel();

    let _ = poller_handle.await;
    let _ = estimator_handle.await;

    Ok(())
}
