use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_CENTER, DEFAULT_ZOOM, MAX_BOUNDS_NORTH_EAST, MAX_BOUNDS_SOUTH_WEST, MIN_ZOOM,
};
use crate::database::TravelLogEntry;
use crate::geo::LatLngBounds;
use crate::store::{Action, Dispatch};
use crate::widget::{ClickHandler, ListenerId, MapHandle};

/// Whether re-running setup re-frames the viewport around the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefitPolicy {
    /// Every effective re-run fits again, discarding manual pan/zoom.
    #[default]
    Always,
    /// Only the first setup of a mount fits.
    First,
}

impl FromStr for RefitPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(RefitPolicy::Always),
            "first" => Ok(RefitPolicy::First),
            other => anyhow::bail!("unknown refit policy '{}'", other),
        }
    }
}

pub fn max_pan_bounds() -> LatLngBounds {
    LatLngBounds::new(MAX_BOUNDS_SOUTH_WEST.into(), MAX_BOUNDS_NORTH_EAST.into())
}

/// Click listener registration that deregisters itself on drop.
pub struct ClickSubscription {
    map: MapHandle,
    id: ListenerId,
}

impl ClickSubscription {
    pub fn register(map: &MapHandle, handler: ClickHandler) -> Self {
        let id = map.on_click(handler);
        Self { map: map.clone(), id }
    }
}

impl Drop for ClickSubscription {
    fn drop(&mut self) {
        self.map.off_click(self.id);
    }
}

/// Everything setup depends on. A change in any of them triggers a re-run.
#[derive(Clone)]
pub struct InitDeps {
    pub map: MapHandle,
    pub logs: Arc<Vec<TravelLogEntry>>,
    pub on_click: ClickHandler,
    pub dispatch: Arc<dyn Dispatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DepsKey {
    map: usize,
    logs: u64,
    on_click: usize,
    dispatch: usize,
}

impl DepsKey {
    fn of(deps: &InitDeps) -> Self {
        Self {
            map: deps.map.ptr() as usize,
            logs: fingerprint(&deps.logs),
            on_click: Arc::as_ptr(&deps.on_click) as *const () as usize,
            dispatch: Arc::as_ptr(&deps.dispatch) as *const () as usize,
        }
    }
}

fn fingerprint(logs: &[TravelLogEntry]) -> u64 {
    let mut hasher = DefaultHasher::new();
    logs.len().hash(&mut hasher);
    for log in logs {
        log.id.hash(&mut hasher);
        log.latitude.to_bits().hash(&mut hasher);
        log.longitude.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

// Per-mount bookkeeping, reset when the map handle changes
#[derive(Default)]
struct Mount {
    subscription: Option<ClickSubscription>,
    published: bool,
    fitted: bool,
}

/// One-time map setup, re-run when its dependencies change.
///
/// Setup waits for the widget's ready signal, falling back to `delay` when the
/// widget never reports. Pending setup is cancelled on re-run and on drop, and
/// at most one click listener is registered at any time.
pub struct MapInitializer {
    delay: Duration,
    refit: RefitPolicy,
    last: Option<DepsKey>,
    pending: Option<JoinHandle<()>>,
    mount: Arc<Mutex<Mount>>,
    // Bumped by every run and teardown; a task holding an older value is stale
    generation: Arc<AtomicU64>,
}

impl MapInitializer {
    pub fn new(delay: Duration, refit: RefitPolicy) -> Self {
        Self {
            delay,
            refit,
            last: None,
            pending: None,
            mount: Arc::new(Mutex::new(Mount::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedules setup unless nothing changed since the last run.
    /// Must be called from within a tokio runtime.
    pub fn run(&mut self, deps: InitDeps) -> bool {
        let key = DepsKey::of(&deps);
        if self.last == Some(key) {
            debug!("map setup dependencies unchanged, skipping");
            return false;
        }
        let new_mount = self.last.map_or(true, |last| last.map != key.map);
        self.last = Some(key);

        let generation = self.cancel_pending();
        {
            let mut mount = lock(&self.mount);
            // Deregister before anything else can register
            mount.subscription = None;
            if new_mount {
                *mount = Mount::default();
            }
        }

        let mount = self.mount.clone();
        let current = self.generation.clone();
        let delay = self.delay;
        let refit = self.refit;
        self.pending = Some(tokio::spawn(async move {
            wait_ready(deps.map.ready(), delay).await;
            let mut mount = lock(&mount);
            // abort() is too late once the ready wait has completed
            if current.load(Ordering::SeqCst) != generation {
                debug!(generation, "map setup superseded, skipping");
                return;
            }
            setup(&mut mount, &deps, refit);
        }));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Whether setup has been scheduled since the last teardown.
    pub fn is_mounted(&self) -> bool {
        self.last.is_some()
    }

    /// Cancels pending setup and removes the click listener.
    pub fn teardown(&mut self) {
        self.cancel_pending();
        *lock(&self.mount) = Mount::default();
        self.last = None;
    }

    // Invalidates any scheduled setup, returning the new generation
    fn cancel_pending(&mut self) -> u64 {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Drop for MapInitializer {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock(mount: &Mutex<Mount>) -> std::sync::MutexGuard<'_, Mount> {
    mount.lock().unwrap_or_else(|e| e.into_inner())
}

async fn wait_ready(mut ready: watch::Receiver<bool>, fallback: Duration) {
    match tokio::time::timeout(fallback, ready.wait_for(|r| *r)).await {
        Ok(_) => debug!("map widget reported ready"),
        Err(_) => debug!(?fallback, "map widget never reported ready, continuing"),
    }
}

fn setup(mount: &mut Mount, deps: &InitDeps, refit: RefitPolicy) {
    let map = &deps.map;

    if !mount.published {
        deps.dispatch.dispatch(Action::SetMap(map.clone()));
        mount.published = true;
    }

    map.invalidate_size();

    if refit == RefitPolicy::Always || !mount.fitted {
        match LatLngBounds::from_points(deps.logs.iter().map(TravelLogEntry::position)) {
            Some(bounds) => map.fit_bounds(bounds),
            None => map.set_view(DEFAULT_CENTER.into(), DEFAULT_ZOOM),
        }
        mount.fitted = true;
    }

    map.set_max_bounds(max_pan_bounds());
    map.set_min_zoom(MIN_ZOOM);

    mount.subscription = None;
    mount.subscription = Some(ClickSubscription::register(map, deps.on_click.clone()));

    let center = map.center();
    info!(
        entries = deps.logs.len(),
        lat = center.lat,
        lng = center.lng,
        zoom = map.zoom(),
        "map initialized"
    );
}
