use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{sse::Event as SseEvent, Html, IntoResponse, Json, Response, Sse},
};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info};

use crate::database::TravelLogEntry;
use crate::geo::LatLng;
use crate::icon::MarkerIcon;
use crate::settings::Settings;
use crate::store::{Action, Dispatch, StateSnapshot};
use crate::view::RenderedMap;
use crate::widget::{MapWidget, Viewport};

use super::events::MapEvent;
use super::state::AppState;

#[derive(RustEmbed)]
#[folder = "frontend/"]
struct Asset;

fn embedded(path: &str, content_type: &'static str) -> Response {
    match Asset::get(path) {
        Some(file) => ([(header::CONTENT_TYPE, content_type)], file.data.into_owned()).into_response(),
        None => {
            error!(path, "embedded asset missing");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub async fn index_html() -> Response {
    match Asset::get("index.html") {
        Some(file) => Html(file.data.into_owned()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn style_css() -> Response {
    embedded("style.css", "text/css")
}

pub async fn script_js() -> Response {
    embedded("app.js", "application/javascript")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapResponse {
    #[serde(flatten)]
    pub rendered: RenderedMap,
    pub viewport: Viewport,
    /// Lets the renderer draw a pending marker that appears later.
    pub pending_icon: MarkerIcon,
    pub state: StateSnapshot,
}

pub async fn get_map(State(state): State<AppState>) -> Json<MapResponse> {
    let logs = state.logs.all();
    Json(MapResponse {
        rendered: state.view.render(&logs),
        viewport: state.map.viewport(),
        pending_icon: MarkerIcon::pending(),
        state: state.store.snapshot(),
    })
}

pub async fn get_logs(State(state): State<AppState>) -> Json<Vec<TravelLogEntry>> {
    Json(state.logs.all().as_ref().clone())
}

pub async fn get_state(State(state): State<AppState>) -> Json<StateSnapshot> {
    Json(state.store.snapshot())
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    let settings = state.settings.lock().unwrap_or_else(|e| e.into_inner()).clone();
    Json(settings)
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub width: f64,
    pub height: f64,
}

/// The browser finished laying out its map container. The first report
/// mounts the map; later ones only re-measure it.
pub async fn map_ready(
    State(state): State<AppState>,
    Json(request): Json<ReadyRequest>,
) -> StatusCode {
    info!(width = request.width, height = request.height, "map container ready");
    state.map.resize(request.width, request.height);
    state.map.mark_ready();
    if !state.mount() {
        state.map.invalidate_size();
    }
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub center: LatLng,
    pub zoom: f64,
}

/// Pan/zoom finished in the browser.
pub async fn map_view(
    State(state): State<AppState>,
    Json(request): Json<ViewRequest>,
) -> StatusCode {
    debug!(
        lat = request.center.lat,
        lng = request.center.lng,
        zoom = request.zoom,
        "browser view changed"
    );
    state.map.sync_view(request.center, request.zoom);
    StatusCode::NO_CONTENT
}

pub async fn map_click(State(state): State<AppState>, Json(at): Json<LatLng>) -> StatusCode {
    if state.map.listener_count() == 0 {
        // Setup has not registered its listener yet
        state.view.on_map_click(at);
    } else {
        state.map.click(at);
    }
    StatusCode::ACCEPTED
}

pub async fn marker_drag_end(
    State(state): State<AppState>,
    Json(at): Json<LatLng>,
) -> StatusCode {
    debug!(lat = at.lat, lng = at.lng, "pending marker moved");
    state.view.on_pending_marker_drag_end(at);
    StatusCode::NO_CONTENT
}

/// Drops the pending marker after the entry form is saved or cancelled.
pub async fn clear_marker(State(state): State<AppState>) -> StatusCode {
    state.store.dispatch(Action::ClearCurrentMarkerLocation);
    StatusCode::NO_CONTENT
}

pub async fn reload_logs(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let count = state.reload_logs().map_err(|e| {
        error!("Failed to reload travel logs: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "count": count,
    })))
}

pub async fn map_events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    let mut event_receiver = state.event_sender.subscribe();

    // New clients start from the current state
    let initial = MapEvent::state(state.store.snapshot());

    tokio::spawn(async move {
        if tx.send(Ok(to_sse(&initial))).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                event = event_receiver.recv() => {
                    match event {
                        Ok(map_event) => {
                            if tx.send(Ok(to_sse(&map_event))).await.is_err() {
                                break; // Client disconnected
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE client lagged");
                        }
                        Err(_) => break, // Channel closed
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(30)) => {
                    if tx.send(Ok(to_sse(&MapEvent::heartbeat()))).await.is_err() {
                        break; // Client disconnected
                    }
                }
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive-message"),
    )
}

fn to_sse(event: &MapEvent) -> SseEvent {
    SseEvent::default()
        .json_data(event)
        .unwrap_or_else(|_| SseEvent::default().data("Error serializing event"))
}
