use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;

use scv::api::App;
use scv::clock::SystemClock;
use scv::config::Config;
use scv::directory::{TargetCatalog, UserDirectory};
use scv::storage::StreamDir;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    let user_directory = match &config.user_directory_url {
        Some(url) => UserDirectory::http(url.clone()),
        None => {
            tracing::warn!("SCV_USER_DIRECTORY_URL not set, running against an empty in-memory user directory");
            UserDirectory::in_memory(Default::default())
        }
    };
    let target_catalog = match &config.target_catalog_url {
        Some(url) => TargetCatalog::http(url.clone()),
        None => {
            tracing::warn!("SCV_TARGET_CATALOG_URL not set, running against an empty in-memory target catalog");
            TargetCatalog::in_memory()
        }
    };

    recover_streams(&config).await?;

    let app = Arc::new(App::new(config.clone(), Arc::new(SystemClock), user_directory, target_catalog));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick_period = app.config.tick_period();
    tokio::spawn(scv::lease::run_tick(Arc::clone(&app), tick_period, shutdown_rx));

    tracing::info!(shard = %app.config.shard_name, addr = %app.config.bind_addr, "starting shard server");
    scv::startup::run(app, shutdown_tx).await
}

/// Completes any checkpoint swap interrupted by a prior crash in every
/// stream directory already on disk, before the shard accepts traffic
/// (`spec.md` §4.3, "Startup recovery"). This repairs file-level state only
/// -- the shard's KV is in-memory and starts empty on every restart, same
/// as the system it replaces; a stream only becomes reachable again once
/// its target re-registers it.
async fn recover_streams(config: &Config) -> anyhow::Result<()> {
    let streams_root = config.streams_dir.join(format!("{}_data", config.shard_name)).join("streams");
    let mut entries = match tokio::fs::read_dir(&streams_root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let Ok(id) = entry.file_name().to_string_lossy().parse() else {
            continue;
        };
        let dir = StreamDir::new(Path::new(&config.streams_dir), &config.shard_name, &id);
        if let Err(err) = dir.recover().await {
            tracing::error!(?id, ?err, "failed to recover stream directory");
        }
    }
    Ok(())
}
