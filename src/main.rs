use kasir_sync::{catalog, config, db, engine, net, outbox, store};

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kasir-sync")]
#[command(about = "Offline-first cache and sync agent for the Kasir POS client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kasir-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Business partition to operate on
  #[arg(short, long)]
  business: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override business if specified on the command line
  let config = if let Some(business) = args.business {
    config::Config {
      default_business: Some(business),
      ..config
    }
  } else {
    config
  };

  let _log_guard = init_tracing()?;

  let db = Arc::new(db::Database::open_default()?);
  let api = net::ApiClient::new(&config)?;
  let app_origin = config.api_base_url()?;

  let response_cache = net::ResponseCache::new(Arc::clone(&db), &config.cache.version);
  let proxy = Arc::new(net::FetchProxy::new(
    response_cache.clone(),
    app_origin.clone(),
    &config.cache.shell_path,
  )?);
  let lifecycle = net::Lifecycle::new(
    response_cache,
    app_origin,
    config.cache.shell_assets.clone(),
  );

  let queue = Arc::new(outbox::OutboxQueue::new(Arc::clone(&db)));
  let drainer =
    outbox::Drainer::new().with_pace(Duration::from_millis(config.sync.drain_pace_ms));

  let catalog = catalog::Catalog::new(
    Arc::clone(&proxy),
    api.clone(),
    store::EntityCache::new(Arc::clone(&db)),
    store::EntityCache::new(Arc::clone(&db)),
    store::EntityCache::new(Arc::clone(&db)),
    store::SyncMeta::new(Arc::clone(&db)),
  );

  let (engine, handles) = engine::Engine::new(
    proxy,
    queue,
    api,
    lifecycle,
    drainer,
    chrono::Duration::days(config.cache.purge_after_days),
  );

  // Periodic drain/purge tick while the agent runs
  let tick_events = handles.events.clone();
  let tick = Duration::from_secs(config.sync.tick_secs);
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(tick);
    interval.tick().await;
    loop {
      interval.tick().await;
      if tick_events.send(engine::EngineEvent::Tick).is_err() {
        break;
      }
    }
  });

  // Surface engine commands; an embedding application would consume these
  let mut commands = handles.commands;
  tokio::spawn(async move {
    while let Some(command) = commands.recv().await {
      tracing::debug!(?command, "engine command");
    }
  });

  // Business context: command line / config first, then whatever was
  // active last time
  let settings = store::Settings::new(Arc::clone(&db));
  let business = config.default_business.or_else(|| {
    settings
      .get("active_business")
      .ok()
      .flatten()
      .and_then(|s| s.parse().ok())
  });

  if let Some(business) = business {
    settings.set("active_business", &business.to_string())?;
    catalog.preload(business).await?;
  }

  // The agent assumes connectivity until told otherwise
  let _ = handles
    .events
    .send(engine::EngineEvent::ConnectivityChanged(true));

  engine.run().await?;

  Ok(())
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("kasir-sync")
    .join("logs");
  std::fs::create_dir_all(&log_dir)?;

  let file_appender = tracing_appender::rolling::daily(&log_dir, "kasir-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(file_appender);

  let filter =
    EnvFilter::try_from_env("KASIR_SYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
