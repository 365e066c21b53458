use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod events;
pub mod handlers;
pub mod state;

pub use self::state::AppState;
use handlers::{
    clear_marker, get_logs, get_map, get_settings, get_state, index_html, map_click,
    map_events_stream, map_ready, map_view, marker_drag_end, reload_logs, script_js, style_css,
};

// Create the main application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_html))
        .route("/style.css", get(style_css))
        .route("/app.js", get(script_js))
        .route("/api/map", get(get_map))
        .route("/api/map/ready", post(map_ready))
        .route("/api/map/view", post(map_view))
        .route("/api/map/click", post(map_click))
        .route("/api/map/marker", post(marker_drag_end))
        .route("/api/map/marker/clear", post(clear_marker))
        .route("/api/logs", get(get_logs))
        .route("/api/logs/reload", post(reload_logs))
        .route("/api/state", get(get_state))
        .route("/api/settings", get(get_settings))
        .route("/api/events", get(map_events_stream))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    // Setup waits for the first browser to report its map as ready
    state.spawn_forwarders();

    let app = create_app(state.clone());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, "HTTP server started at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    state.unmount();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::entry;
    use crate::database::LogStore;
    use crate::geo::{LatLng, LatLngBounds};
    use crate::settings::Settings;
    use crate::widget::{MapCommand, Viewport};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_settings() -> Settings {
        Settings {
            tile_url: "https://tiles.example/{z}/{x}/{y}.png".to_string(),
            init_delay_ms: 20,
            ..Settings::default()
        }
    }

    fn app_state(logs: LogStore) -> AppState {
        AppState::new(test_settings(), logs)
    }

    async fn json_of(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn map_endpoint_renders_entries() {
        let state = app_state(LogStore::from_entries(vec![
            entry("a", 30.0, -90.0),
            entry("b", 35.0, -95.0),
        ]));
        let response = create_app(state)
            .oneshot(Request::get("/api/map").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_of(response).await;
        assert_eq!(body["markers"].as_array().unwrap().len(), 2);
        assert_eq!(body["markers"][0]["key"], "a");
        assert_eq!(body["markers"][0]["popup"]["visitDate"], "1/31/2024");
        assert_eq!(body["options"]["tileLayer"]["url"], "https://tiles.example/{z}/{x}/{y}.png");
        assert!(body["pendingMarker"].is_null());
        assert_eq!(body["viewport"]["zoom"], 4.0);
        assert_eq!(body["state"]["sidebarVisible"], false);
    }

    #[tokio::test]
    async fn click_after_mount_places_marker_and_flies() {
        let state = app_state(LogStore::new());
        state.mount();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.map.listener_count(), 1);

        let app = create_app(state.clone());
        let response = app
            .oneshot(post_json("/api/map/click", serde_json::json!({"lat": 40.0, "lng": 260.0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let snapshot = state.store.snapshot();
        assert!(snapshot.sidebar_visible);
        assert!(snapshot.map_ready);
        assert_eq!(snapshot.current_marker_location, Some(LatLng::new(40.0, -100.0)));
        assert_eq!(state.map.viewport().zoom, 5.0);
        assert_eq!(state.map.viewport().center, LatLng::new(40.0, -100.0));
    }

    #[tokio::test]
    async fn drag_and_clear_update_pending_marker() {
        let state = app_state(LogStore::new());
        let app = create_app(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/map/marker", serde_json::json!({"lat": 41.5, "lng": -101.25})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            state.store.snapshot().current_marker_location,
            Some(LatLng::new(41.5, -101.25))
        );

        let response = app
            .clone()
            .oneshot(Request::get("/api/map").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_of(response).await;
        assert_eq!(body["pendingMarker"]["draggable"], true);
        assert_eq!(body["pendingMarker"]["icon"]["icon_size"][0], 40);

        app.oneshot(post_json("/api/map/marker/clear", Value::Null))
            .await
            .unwrap();
        assert!(state.store.snapshot().current_marker_location.is_none());
    }

    #[tokio::test]
    async fn ready_resizes_headless_map() {
        let state = app_state(LogStore::new());
        let response = create_app(state.clone())
            .oneshot(post_json("/api/map/ready", serde_json::json!({"width": 800.0, "height": 600.0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.map.viewport().size, (800.0, 600.0));
    }

    #[tokio::test]
    async fn setup_waits_for_browser_ready_and_fits_its_size() {
        let state = app_state(LogStore::from_entries(vec![
            entry("a", 30.0, -90.0),
            entry("b", 35.0, -95.0),
        ]));
        let app = create_app(state.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.store.map().is_none());
        assert_eq!(state.map.listener_count(), 0);

        app.oneshot(post_json("/api/map/ready", serde_json::json!({"width": 400.0, "height": 300.0})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(state.store.map().is_some());
        assert_eq!(state.map.listener_count(), 1);
        let bounds = LatLngBounds::new(LatLng::new(30.0, -95.0), LatLng::new(35.0, -90.0));
        let reported = Viewport { size: (400.0, 300.0), ..Viewport::default() };
        let vp = state.map.viewport();
        assert_eq!(vp.size, (400.0, 300.0));
        assert_eq!(vp.zoom, reported.bounds_zoom(&bounds));
        assert_eq!(vp.zoom, 6.0);
    }

    #[tokio::test]
    async fn click_keeps_zoom_reported_by_browser() {
        let state = app_state(LogStore::new());
        let app = create_app(state.clone());
        app.clone()
            .oneshot(post_json("/api/map/ready", serde_json::json!({"width": 800.0, "height": 600.0})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut commands = state.map.subscribe();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/map/view",
                serde_json::json!({"center": {"lat": 39.0, "lng": -95.0}, "zoom": 8.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(commands.try_recv().is_err());

        app.oneshot(post_json("/api/map/click", serde_json::json!({"lat": 40.0, "lng": -100.0})))
            .await
            .unwrap();
        assert_eq!(
            commands.try_recv().unwrap(),
            MapCommand::FlyTo { center: LatLng::new(40.0, -100.0), zoom: 8.0 }
        );
    }

    #[tokio::test]
    async fn click_before_ready_records_location_without_flying() {
        let state = app_state(LogStore::new());
        let mut commands = state.map.subscribe();
        let response = create_app(state.clone())
            .oneshot(post_json("/api/map/click", serde_json::json!({"lat": 40.0, "lng": 260.0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let snapshot = state.store.snapshot();
        assert!(snapshot.sidebar_visible);
        assert!(!snapshot.map_ready);
        assert_eq!(snapshot.current_marker_location, Some(LatLng::new(40.0, -100.0)));
        assert_eq!(state.map.listener_count(), 0);
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn reload_broadcasts_new_markers() {
        let path = std::env::temp_dir()
            .join(format!("travel_log_map_reload_{}.json", std::process::id()));
        let logs = serde_json::json!([
            {"_id": "a", "title": "Denver", "latitude": 39.7, "longitude": -105.0,
             "visitDate": "2024-01-31T23:00:00Z"},
            {"_id": "b", "title": "Austin", "latitude": 30.3, "longitude": -97.7,
             "visitDate": "2024-03-02T12:00:00Z"},
        ]);
        std::fs::write(&path, logs.to_string()).unwrap();

        let settings = Settings {
            logs_file: Some(path.to_string_lossy().into_owned()),
            ..test_settings()
        };
        let state = AppState::new(settings, LogStore::new());
        let mut events = state.event_sender.subscribe();

        let response = create_app(state.clone())
            .oneshot(post_json("/api/logs/reload", Value::Null))
            .await
            .unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["count"], 2);

        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, "logs");
        let markers = event.data.markers.unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1].key.as_deref(), Some("b"));
        // Not mounted yet, so nothing is set up
        assert_eq!(state.map.listener_count(), 0);
    }

    #[tokio::test]
    async fn reload_without_logs_file_fails() {
        let state = app_state(LogStore::new());
        let response = create_app(state)
            .oneshot(post_json("/api/logs/reload", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn frontend_is_embedded() {
        let state = app_state(LogStore::new());
        let response = create_app(state)
            .oneshot(Request::get("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/javascript"
        );
    }
}
