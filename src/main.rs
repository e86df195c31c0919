use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stalker_relay::{
    config::Config,
    portal::PortalClient,
    services::{
        AlertSink, FallbackResolver, Housekeeper, LinkCache, MacPoolManager, PortalAdmin,
        RateLimiter, StreamProber, StreamRelay, TracingAlertSink,
    },
    store::{JsonPortalStore, PortalStore},
    utils::HttpClientFactory,
    web::{AppState, WebServer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "stalker-relay")]
#[command(version)]
#[command(about = "Stream resolution and relay service for Stalker-type IPTV portals")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    info!("Starting Stalker Relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let store: Arc<dyn PortalStore> = Arc::new(JsonPortalStore::open(&config.store.path).await?);
    info!("Portal store opened at {}", config.store.path.display());

    let http = HttpClientFactory::new(&config.portal_client);
    let api = Arc::new(PortalClient::new(http));
    let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink);
    let pool = Arc::new(MacPoolManager::new(store.clone()));
    let cache = Arc::new(LinkCache::from_config(&config.cache));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.cooldown));
    let prober = Arc::new(StreamProber::from_settings(&config.relay));

    let resolver = FallbackResolver::new(
        store.clone(),
        api.clone(),
        pool.clone(),
        cache.clone(),
        limiter.clone(),
        prober,
        alerts.clone(),
        config.relay.clone(),
    );
    let relay = StreamRelay::new(pool.clone(), alerts, config.relay.chunk_size);
    let admin = PortalAdmin::new(store, api);

    let housekeeper = Housekeeper::from_config(cache, limiter, &config.rate_limit);
    tokio::spawn(housekeeper.start());
    info!("Housekeeper started");

    let state = AppState {
        resolver: Arc::new(resolver),
        relay: Arc::new(relay),
        pool,
        admin: Arc::new(admin),
    };
    let web_server = WebServer::new(&config.web, state)?;

    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve().await?;

    Ok(())
}

fn init_logging(level: &str, format: LogFormat) {
    let log_filter = if level == "trace" {
        format!("stalker_relay={},tower_http=trace", level)
    } else {
        format!("stalker_relay={},tower_http=info", level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
