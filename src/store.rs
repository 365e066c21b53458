use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use crate::geo::LatLng;
use crate::widget::MapHandle;

#[derive(Debug, Clone, Default)]
pub struct TravelLogState {
    pub map: Option<MapHandle>,
    pub sidebar_visible: bool,
    pub current_marker_location: Option<LatLng>,
}

#[derive(Debug, Clone)]
pub enum Action {
    SetMap(MapHandle),
    SetSidebarVisible(bool),
    SetCurrentMarkerLocation(LatLng),
    ClearCurrentMarkerLocation,
}

/// Serializable view of the state for the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub map_ready: bool,
    pub sidebar_visible: bool,
    pub current_marker_location: Option<LatLng>,
}

impl From<&TravelLogState> for StateSnapshot {
    fn from(state: &TravelLogState) -> Self {
        Self {
            map_ready: state.map.is_some(),
            sidebar_visible: state.sidebar_visible,
            current_marker_location: state.current_marker_location,
        }
    }
}

/// Applies an action. Returns `false` when nothing changed.
pub fn reduce(state: &mut TravelLogState, action: Action) -> bool {
    match action {
        Action::SetMap(map) => {
            if state.map.as_ref() == Some(&map) {
                return false;
            }
            state.map = Some(map);
        }
        Action::SetSidebarVisible(visible) => {
            if state.sidebar_visible == visible {
                return false;
            }
            state.sidebar_visible = visible;
        }
        Action::SetCurrentMarkerLocation(location) => {
            if state.current_marker_location == Some(location) {
                return false;
            }
            state.current_marker_location = Some(location);
        }
        Action::ClearCurrentMarkerLocation => {
            if state.current_marker_location.is_none() {
                return false;
            }
            state.current_marker_location = None;
        }
    }
    true
}

pub trait Dispatch: Send + Sync {
    fn dispatch(&self, action: Action);
}

/// Shared application state. Cloning shares the same container.
#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<TravelLogState>>,
    changes: broadcast::Sender<StateSnapshot>,
}

impl Store {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(TravelLogState::default())),
            changes,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::from(&*self.state.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn map(&self) -> Option<MapHandle> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).map.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.changes.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for Store {
    fn dispatch(&self, action: Action) {
        debug!(?action, "dispatch");
        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if !reduce(&mut state, action) {
                return;
            }
            StateSnapshot::from(&*state)
        };
        let _ = self.changes.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{HeadlessMap, MapWidget};

    fn handle() -> MapHandle {
        let widget: Arc<dyn MapWidget> = Arc::new(HeadlessMap::new());
        MapHandle::new(widget)
    }

    #[test]
    fn reducer_applies_each_action() {
        let mut state = TravelLogState::default();
        let map = handle();
        assert!(reduce(&mut state, Action::SetMap(map.clone())));
        assert!(reduce(&mut state, Action::SetSidebarVisible(true)));
        assert!(reduce(&mut state, Action::SetCurrentMarkerLocation(LatLng::new(1.0, 2.0))));
        assert_eq!(state.map, Some(map));
        assert!(state.sidebar_visible);
        assert_eq!(state.current_marker_location, Some(LatLng::new(1.0, 2.0)));

        assert!(reduce(&mut state, Action::ClearCurrentMarkerLocation));
        assert!(state.current_marker_location.is_none());
    }

    #[test]
    fn repeated_actions_are_no_ops() {
        let mut state = TravelLogState::default();
        let map = handle();
        reduce(&mut state, Action::SetMap(map.clone()));
        assert!(!reduce(&mut state, Action::SetMap(map)));
        assert!(!reduce(&mut state, Action::SetSidebarVisible(false)));
        assert!(!reduce(&mut state, Action::ClearCurrentMarkerLocation));
    }

    #[test]
    fn dispatch_notifies_only_on_change() {
        let store = Store::new();
        let mut rx = store.subscribe();
        store.dispatch(Action::SetSidebarVisible(true));
        store.dispatch(Action::SetSidebarVisible(true));
        let snapshot = rx.try_recv().unwrap();
        assert!(snapshot.sidebar_visible);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new();
        let other = store.clone();
        other.dispatch(Action::SetCurrentMarkerLocation(LatLng::new(3.0, 4.0)));
        assert_eq!(store.snapshot().current_marker_location, Some(LatLng::new(3.0, 4.0)));
        assert!(!store.snapshot().map_ready);
    }
}
