use anyhow::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::database::LogStore;
use crate::init::MapInitializer;
use crate::settings::Settings;
use crate::store::Store;
use crate::view::{MapOptions, MapView};
use crate::widget::{HeadlessMap, MapHandle, MapWidget};
use super::events::MapEvent;

// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub logs: LogStore,
    pub store: Store,
    pub view: Arc<MapView>,
    pub map: Arc<HeadlessMap>,
    pub initializer: Arc<Mutex<MapInitializer>>,
    pub settings: Arc<Mutex<Settings>>,
    pub event_sender: broadcast::Sender<MapEvent>,
}

impl AppState {
    pub fn new(settings: Settings, logs: LogStore) -> Self {
        let store = Store::new();
        let view = Arc::new(MapView::new(MapOptions::from_settings(&settings), store.clone()));
        let initializer = MapInitializer::new(
            Duration::from_millis(settings.init_delay_ms),
            settings.refit,
        );
        let (event_sender, _) = broadcast::channel(100);
        Self {
            logs,
            store,
            view,
            map: Arc::new(HeadlessMap::new()),
            initializer: Arc::new(Mutex::new(initializer)),
            settings: Arc::new(Mutex::new(settings)),
            event_sender,
        }
    }

    pub fn map_handle(&self) -> MapHandle {
        MapHandle::new(self.map.clone() as Arc<dyn MapWidget>)
    }

    /// Runs map setup against the current entries. Driven by the browser's
    /// ready report. Needs a tokio runtime.
    pub fn mount(&self) -> bool {
        let deps = self.view.init_deps(self.map_handle(), self.logs.all());
        let scheduled = self
            .initializer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .run(deps);
        debug!(scheduled, entries = self.logs.all().len(), "map mount");
        scheduled
    }

    pub fn is_mounted(&self) -> bool {
        self.initializer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_mounted()
    }

    pub fn unmount(&self) {
        let mut initializer = self.initializer.lock().unwrap_or_else(|e| e.into_inner());
        if initializer.is_pending() {
            debug!("cancelling pending map setup");
        }
        initializer.teardown();
    }

    /// Re-reads the configured log file and re-runs setup when entries changed.
    pub fn reload_logs(&self) -> Result<usize> {
        let logs_file = self
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .logs_file
            .clone();
        let Some(logs_file) = logs_file else {
            anyhow::bail!("no logs_file configured");
        };
        let count = self.logs.load_from_file(Path::new(&logs_file))?;
        info!(count, file = %logs_file, "reloaded travel logs");

        let markers = self.view.render(&self.logs.all()).markers;
        // No browser connected is fine
        let _ = self.event_sender.send(MapEvent::logs(markers));

        // Before the first ready report there is nothing to re-run
        if self.is_mounted() {
            self.mount();
        }
        Ok(count)
    }

    /// Forwards state changes and map commands into the SSE channel.
    pub fn spawn_forwarders(&self) {
        let mut changes = self.store.subscribe();
        let sender = self.event_sender.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(snapshot) => {
                        let _ = sender.send(MapEvent::state(snapshot));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "state forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut commands = self.map.subscribe();
        let sender = self.event_sender.clone();
        tokio::spawn(async move {
            loop {
                match commands.recv().await {
                    Ok(command) => {
                        let _ = sender.send(MapEvent::command(command));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "map command forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
