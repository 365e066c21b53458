use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::constants::{
    DEFAULT_CENTER, DEFAULT_ZOOM, FLY_TO_MIN_ZOOM, MAP_BACKGROUND, MAX_BOUNDS_VISCOSITY,
    MIN_ZOOM, POPUP_OFFSET, TILE_ATTRIBUTION,
};
use crate::database::TravelLogEntry;
use crate::geo::{LatLng, LatLngBounds};
use crate::icon::MarkerIcon;
use crate::init::{max_pan_bounds, InitDeps};
use crate::settings::Settings;
use crate::store::{Action, Dispatch, Store};
use crate::widget::{ClickHandler, MapHandle};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLayerOptions {
    pub url: String,
    pub attribution: &'static str,
}

/// Fixed map container configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    pub center: LatLng,
    pub zoom: f64,
    pub max_bounds: LatLngBounds,
    pub min_zoom: f64,
    pub world_copy_jump: bool,
    pub max_bounds_viscosity: f64,
    pub zoom_control: bool,
    pub background: &'static str,
    pub tile_layer: TileLayerOptions,
}

impl MapOptions {
    pub fn new(tile_url: impl Into<String>) -> Self {
        Self {
            center: DEFAULT_CENTER.into(),
            zoom: DEFAULT_ZOOM,
            max_bounds: max_pan_bounds(),
            min_zoom: MIN_ZOOM,
            world_copy_jump: true,
            max_bounds_viscosity: MAX_BOUNDS_VISCOSITY,
            zoom_control: true,
            background: MAP_BACKGROUND,
            tile_layer: TileLayerOptions {
                url: tile_url.into(),
                attribution: TILE_ATTRIBUTION,
            },
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.tile_url.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupView {
    pub title: String,
    pub image: String,
    pub description: String,
    pub visit_date: String,
    pub offset: [i32; 2],
    pub html: String,
}

impl PopupView {
    pub fn for_entry(entry: &TravelLogEntry) -> Self {
        let visit_date = format_visit_date(&entry.visit_date);
        let html = popup_html(entry, &visit_date);
        Self {
            title: entry.title.clone(),
            image: entry.image.clone(),
            description: entry.description.clone(),
            visit_date,
            offset: [POPUP_OFFSET.0, POPUP_OFFSET.1],
            html,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerView {
    pub key: Option<String>,
    pub position: LatLng,
    pub draggable: bool,
    pub icon: MarkerIcon,
    pub popup: Option<PopupView>,
}

/// Everything the renderer needs to draw the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMap {
    pub options: MapOptions,
    pub pending_marker: Option<MarkerView>,
    pub markers: Vec<MarkerView>,
}

/// Locale date (en-US, M/D/YYYY) taken in UTC, so it never shifts with the
/// viewer's offset.
pub fn format_visit_date(date: &DateTime<Utc>) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn popup_html(entry: &TravelLogEntry, visit_date: &str) -> String {
    let title = escape_html(&entry.title);
    format!(
        r#"<p class="text-lg font-bold">{title}</p><div class="flex justify-center items-center"><picture><img alt="{title}" src="{image}" class="w-96" /></picture></div><p>{description}</p><p class="text-sm italic">{date}</p>"#,
        image = escape_html(&entry.image),
        description = escape_html(&entry.description),
        date = escape_html(visit_date),
    )
}

// Sidebar first, then the pending location, then the camera
fn handle_click(store: &Store, dispatch: &dyn Dispatch, at: LatLng) {
    let location = at.wrap();
    dispatch.dispatch(Action::SetSidebarVisible(true));
    dispatch.dispatch(Action::SetCurrentMarkerLocation(location));
    match store.map() {
        Some(map) => {
            let zoom = map.zoom();
            let target = if zoom > FLY_TO_MIN_ZOOM { zoom } else { FLY_TO_MIN_ZOOM };
            map.fly_to(location, target);
        }
        None => debug!("map not published yet, skipping fly-to"),
    }
}

pub struct MapView {
    options: MapOptions,
    store: Store,
    dispatch: Arc<dyn Dispatch>,
    click_handler: ClickHandler,
}

impl MapView {
    pub fn new(options: MapOptions, store: Store) -> Self {
        let dispatch: Arc<dyn Dispatch> = Arc::new(store.clone());
        let click_handler: ClickHandler = {
            let store = store.clone();
            let dispatch = dispatch.clone();
            Arc::new(move |at| handle_click(&store, dispatch.as_ref(), at))
        };
        Self {
            options,
            store,
            dispatch,
            click_handler,
        }
    }

    /// Same handler for the lifetime of the view; the map handle is read per click.
    pub fn click_handler(&self) -> ClickHandler {
        self.click_handler.clone()
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatch> {
        self.dispatch.clone()
    }

    pub fn on_map_click(&self, at: LatLng) {
        (self.click_handler)(at);
    }

    pub fn on_pending_marker_drag_end(&self, at: LatLng) {
        self.dispatch
            .dispatch(Action::SetCurrentMarkerLocation(at.wrap()));
    }

    pub fn init_deps(&self, map: MapHandle, logs: Arc<Vec<TravelLogEntry>>) -> InitDeps {
        InitDeps {
            map,
            logs,
            on_click: self.click_handler(),
            dispatch: self.dispatcher(),
        }
    }

    pub fn render(&self, logs: &[TravelLogEntry]) -> RenderedMap {
        let pending_marker = self
            .store
            .snapshot()
            .current_marker_location
            .map(|position| MarkerView {
                key: None,
                position,
                draggable: true,
                icon: MarkerIcon::pending(),
                popup: None,
            });

        let entry_icon = MarkerIcon::entry();
        let markers = logs
            .iter()
            .map(|log| MarkerView {
                key: Some(log.id.clone()),
                position: log.position(),
                draggable: false,
                icon: entry_icon.clone(),
                popup: Some(PopupView::for_entry(log)),
            })
            .collect();

        RenderedMap {
            options: self.options.clone(),
            pending_marker,
            markers,
        }
    }
}
