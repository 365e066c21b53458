use serde::Serialize;

use crate::store::StateSnapshot;
use crate::view::MarkerView;
use crate::widget::MapCommand;

// SSE event envelope
#[derive(Debug, Clone, Serialize)]
pub struct MapEvent {
    pub event_type: String,
    pub data: MapEventData,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MapEventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<MapCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<Vec<MarkerView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MapEvent {
    pub fn state(snapshot: StateSnapshot) -> Self {
        Self {
            event_type: "state".to_string(),
            data: MapEventData {
                state: Some(snapshot),
                ..Default::default()
            },
        }
    }

    pub fn command(command: MapCommand) -> Self {
        Self {
            event_type: "map_command".to_string(),
            data: MapEventData {
                command: Some(command),
                ..Default::default()
            },
        }
    }

    /// Entry markers after the log list was replaced.
    pub fn logs(markers: Vec<MarkerView>) -> Self {
        Self {
            event_type: "logs".to_string(),
            data: MapEventData {
                markers: Some(markers),
                ..Default::default()
            },
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            event_type: "heartbeat".to_string(),
            data: MapEventData {
                message: Some("SSE connection alive".to_string()),
                ..Default::default()
            },
        }
    }
}
