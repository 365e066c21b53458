use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::constants::{
    DEFAULT_CENTER, DEFAULT_VIEWPORT_SIZE, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM, TILE_SIZE,
};
use crate::geo::{LatLng, LatLngBounds};

pub type ClickHandler = Arc<dyn Fn(LatLng) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Operations the map view needs from a map-rendering library.
pub trait MapWidget: Send + Sync {
    /// Re-reads the container size after a layout change.
    fn invalidate_size(&self);
    fn fit_bounds(&self, bounds: LatLngBounds);
    fn set_view(&self, center: LatLng, zoom: f64);
    fn set_max_bounds(&self, bounds: LatLngBounds);
    fn set_min_zoom(&self, zoom: f64);
    fn zoom(&self) -> f64;
    fn center(&self) -> LatLng;
    /// Animated pan/zoom to a point.
    fn fly_to(&self, center: LatLng, zoom: f64);
    fn on_click(&self, handler: ClickHandler) -> ListenerId;
    fn off_click(&self, id: ListenerId);
    /// Flips to `true` once the widget has finished its own layout.
    fn ready(&self) -> watch::Receiver<bool>;
}

/// Shared reference to a live map. Equality is identity.
#[derive(Clone)]
pub struct MapHandle(Arc<dyn MapWidget>);

impl MapHandle {
    pub fn new(widget: Arc<dyn MapWidget>) -> Self {
        Self(widget)
    }

    pub fn ptr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for MapHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr() == other.ptr()
    }
}

impl Eq for MapHandle {}

impl Deref for MapHandle {
    type Target = dyn MapWidget;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MapHandle").field(&self.ptr()).finish()
    }
}

/// View changes mirrored to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MapCommand {
    InvalidateSize { width: f64, height: f64 },
    SetView { center: LatLng, zoom: f64 },
    FitBounds { bounds: LatLngBounds, center: LatLng, zoom: f64 },
    FlyTo { center: LatLng, zoom: f64 },
    SetMaxBounds { bounds: LatLngBounds },
    SetMinZoom { zoom: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub max_bounds: Option<LatLngBounds>,
    pub size: (f64, f64),
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER.into(),
            zoom: DEFAULT_ZOOM,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            max_bounds: None,
            size: DEFAULT_VIEWPORT_SIZE,
        }
    }
}

impl Viewport {
    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    // Viscosity 1.0: the center never leaves the max bounds
    fn clamp_center(&self, center: LatLng) -> LatLng {
        match self.max_bounds {
            Some(bounds) => bounds.clamp(center),
            None => center,
        }
    }

    /// Highest zoom at which `bounds` fits inside the viewport.
    pub fn bounds_zoom(&self, bounds: &LatLngBounds) -> f64 {
        let (x1, y1) = project(bounds.south_west);
        let (x2, y2) = project(bounds.north_east);
        let width = (x2 - x1).abs();
        let height = (y2 - y1).abs();
        if width == 0.0 && height == 0.0 {
            return self.max_zoom;
        }
        let scale_x = if width > 0.0 { self.size.0 / width } else { f64::INFINITY };
        let scale_y = if height > 0.0 { self.size.1 / height } else { f64::INFINITY };
        let zoom = scale_x.min(scale_y).log2().floor();
        self.clamp_zoom(zoom)
    }
}

// Spherical Mercator in pixels at zoom 0
fn project(point: LatLng) -> (f64, f64) {
    let lat = point.lat.clamp(-85.0511287798, 85.0511287798).to_radians();
    let x = (point.lng + 180.0) / 360.0 * TILE_SIZE;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * TILE_SIZE;
    (x, y)
}

/// Server-side map that keeps the authoritative viewport and
/// streams every change to connected browsers.
pub struct HeadlessMap {
    viewport: Mutex<Viewport>,
    listeners: Mutex<BTreeMap<ListenerId, ClickHandler>>,
    next_listener: AtomicU64,
    commands: broadcast::Sender<MapCommand>,
    ready: watch::Sender<bool>,
}

impl HeadlessMap {
    pub fn new() -> Self {
        let (commands, _) = broadcast::channel(100);
        let (ready, _) = watch::channel(false);
        Self {
            viewport: Mutex::new(Viewport::default()),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(1),
            commands,
            ready,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapCommand> {
        self.commands.subscribe()
    }

    pub fn viewport(&self) -> Viewport {
        self.lock_viewport().clone()
    }

    /// Container size reported by the renderer.
    pub fn resize(&self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.lock_viewport().size = (width, height);
        }
    }

    /// Records a pan/zoom the user made in the browser. Nothing is echoed back.
    pub fn sync_view(&self, center: LatLng, zoom: f64) {
        let mut vp = self.lock_viewport();
        vp.zoom = vp.clamp_zoom(zoom);
        vp.center = center;
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Delivers a click to every registered listener.
    pub fn click(&self, at: LatLng) {
        // Handlers call back into the map, so the lock is released first
        let handlers: Vec<ClickHandler> = self.lock_listeners().values().cloned().collect();
        debug!(lat = at.lat, lng = at.lng, listeners = handlers.len(), "map click");
        for handler in handlers {
            handler(at);
        }
    }

    fn emit(&self, command: MapCommand) {
        // No browser connected is fine
        let _ = self.commands.send(command);
    }

    fn lock_viewport(&self) -> std::sync::MutexGuard<'_, Viewport> {
        self.viewport.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<ListenerId, ClickHandler>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for HeadlessMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapWidget for HeadlessMap {
    fn invalidate_size(&self) {
        let (width, height) = self.lock_viewport().size;
        self.emit(MapCommand::InvalidateSize { width, height });
    }

    fn fit_bounds(&self, bounds: LatLngBounds) {
        let command = {
            let mut vp = self.lock_viewport();
            vp.zoom = vp.bounds_zoom(&bounds);
            vp.center = vp.clamp_center(bounds.center());
            MapCommand::FitBounds { bounds, center: vp.center, zoom: vp.zoom }
        };
        self.emit(command);
    }

    fn set_view(&self, center: LatLng, zoom: f64) {
        let command = {
            let mut vp = self.lock_viewport();
            vp.zoom = vp.clamp_zoom(zoom);
            vp.center = vp.clamp_center(center);
            MapCommand::SetView { center: vp.center, zoom: vp.zoom }
        };
        self.emit(command);
    }

    fn set_max_bounds(&self, bounds: LatLngBounds) {
        {
            let mut vp = self.lock_viewport();
            vp.max_bounds = Some(bounds);
            vp.center = bounds.clamp(vp.center);
        }
        self.emit(MapCommand::SetMaxBounds { bounds });
    }

    fn set_min_zoom(&self, zoom: f64) {
        {
            let mut vp = self.lock_viewport();
            vp.min_zoom = zoom;
            if vp.zoom < zoom {
                vp.zoom = zoom;
            }
        }
        self.emit(MapCommand::SetMinZoom { zoom });
    }

    fn zoom(&self) -> f64 {
        self.lock_viewport().zoom
    }

    fn center(&self) -> LatLng {
        self.lock_viewport().center
    }

    fn fly_to(&self, center: LatLng, zoom: f64) {
        let command = {
            let mut vp = self.lock_viewport();
            vp.zoom = vp.clamp_zoom(zoom);
            vp.center = vp.clamp_center(center);
            MapCommand::FlyTo { center: vp.center, zoom: vp.zoom }
        };
        self.emit(command);
    }

    fn on_click(&self, handler: ClickHandler) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().insert(id, handler);
        id
    }

    fn off_click(&self, id: ListenerId) {
        self.lock_listeners().remove(&id);
    }

    fn ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }
}
