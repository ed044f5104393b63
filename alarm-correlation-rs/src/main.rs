use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use anyhow::Context;
use envconfig::Envconfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use alarm_correlation_rs::config::Config;
use alarm_correlation_rs::job::{self, RunOptions};
use alarm_correlation_rs::store::PostgresStore;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

fn setup_metrics(config: &Config) -> anyhow::Result<()> {
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("invalid BIND_HOST `{}`", config.host))?;
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(host, config.port))
        .install()
        .context("failed to start prometheus exporter")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    info!("starting correlation matrix build");
    let started = Instant::now();

    let config = Config::init_from_env().context("failed to load configuration from env")?;
    setup_metrics(&config)?;

    let store = PostgresStore::connect(&config)
        .await
        .context("event store unreachable, nothing processed")?;
    info!("event store connection established");

    store
        .ensure_schema()
        .await
        .context("schema/index maintenance failed")?;

    let stats = job::run(&store, &RunOptions::from(&config)).await?;

    info!(
        days = stats.days_total,
        failed_days = stats.days_failed,
        scanned = stats.scanned,
        inserted = stats.inserted,
        updated = stats.updated,
        distinct_keys = stats.key_tally.len(),
        elapsed_secs = started.elapsed().as_secs(),
        "all processing completed"
    );
    debug!(tally = ?stats.key_tally, "primary key occurrence tally");
    Ok(())
}
