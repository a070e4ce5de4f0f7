use std::sync::Arc;

use clap::Parser;
use relay_core::{RelayConfig, RelayMode, Sleeper, TokioSleeper};
use relay_dispatch::{HttpWebhook, ProfileCache, RelayDispatcher};
use relay_runner::Pipeline;
use relay_source::{CursorPager, HttpSourceApi, PacedSource, RateLimiter};
use relay_store::MessageStore;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "relay", version, about = "Ingest a channel's history and relay it to a webhook")]
struct Cli {
    /// Config file (default: $RELAY_CONFIG, then ~/.relay/relay.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override relay.mode: off, database (backlog) or receipt (immediate).
    #[arg(long)]
    mode: Option<RelayMode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay=info,relay_runner=info,relay_source=info,relay_dispatch=info,relay_store=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // config: --config > RELAY_CONFIG env > ~/.relay/relay.toml
    let config_path = cli.config.or_else(|| std::env::var("RELAY_CONFIG").ok());
    let mut config = RelayConfig::load(config_path.as_deref())?;
    if let Some(mode) = cli.mode {
        config.relay.mode = mode;
        config.validate()?;
    }

    let mut pipeline = build_pipeline(&config)?;
    let summary = pipeline.run().await?;
    info!(?summary, "done");
    Ok(())
}

fn build_pipeline(config: &RelayConfig) -> anyhow::Result<Pipeline> {
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);

    let store = Arc::new(MessageStore::open(&config.database.path)?);

    let api = HttpSourceApi::new(config.source.token.clone(), Some(config.source.api.clone()));
    let limiter = RateLimiter::per_minute(config.source.rpm, Arc::clone(&sleeper));
    info!(
        rpm = config.source.rpm,
        interval_ms = limiter.interval().as_millis() as u64,
        "source rate limit"
    );
    let source = Arc::new(PacedSource::new(Arc::new(api), limiter));
    let pager = CursorPager::new(
        Arc::clone(&source),
        Arc::clone(&store),
        config.source.channel.clone(),
    );

    let dispatcher = match config.relay.webhook.as_deref() {
        Some(url) if config.relay.is_active() => {
            info!(relay_target = %config.relay.target, mode = %config.relay.mode, "relay enabled");
            Some(RelayDispatcher::new(
                config.relay.target,
                Arc::new(HttpWebhook::new(url.to_string())),
                ProfileCache::new(source),
                sleeper,
            ))
        }
        _ => None,
    };

    Ok(Pipeline::new(store, pager, dispatcher, config.relay.mode))
}
