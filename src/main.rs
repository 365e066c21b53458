use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod constants;
mod database;
mod geo;
mod icon;
mod init;
mod server;
mod settings;
mod store;
mod utils;
mod view;
mod widget;

use database::LogStore;
use server::{start_server, AppState};
use settings::Settings;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("travel_log_map=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "travel log map starting");

    if !Settings::config_path().exists() {
        match Settings::default().save() {
            Ok(()) => info!(path = %Settings::config_path().display(), "wrote default config"),
            Err(e) => warn!(error = %e, "could not write default config"),
        }
    }
    let settings = Settings::load().context("Failed to load settings")?;
    if settings.tile_url.is_empty() {
        warn!("no tile URL configured (MAP_TILE_URL), the map will render without tiles");
    }

    let logs = LogStore::new();
    match settings.logs_file.as_deref() {
        Some(path) => {
            let count = logs.load_from_file(Path::new(path))?;
            info!(count, file = path, "loaded travel logs");
        }
        None => info!("no logs_file configured, starting with an empty map"),
    }

    let port = settings.port;
    let auto_open = settings.auto_open_browser;
    let state = AppState::new(settings, logs);

    if auto_open {
        let url = format!("http://127.0.0.1:{}", port);
        if let Err(e) = utils::open_browser(&url) {
            warn!(error = %e, "could not open browser");
        }
    }

    start_server(state, port).await
}
