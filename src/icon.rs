use serde::Serialize;

use crate::constants::{MARKER_FILL, MARKER_SIZE, PENDING_MARKER_FILL, PENDING_MARKER_SIZE};

/// SVG pin icon handed to each marker explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerIcon {
    pub class_name: &'static str,
    pub html: String,
    pub icon_size: [u32; 2],
    /// Pixel offset of the pin tip: bottom centre.
    pub icon_anchor: [u32; 2],
}

impl MarkerIcon {
    pub fn pin(fill: &str, size: u32) -> Self {
        let html = format!(
            r#"<svg viewBox="0 0 24 24" width="{size}" height="{size}" fill="{fill}" stroke="black" stroke-width="1" stroke-linecap="round" stroke-linejoin="round" class="shadow-xl"><path d="M21 10c0 7-9 13-9 13s-9-6-9-13a9 9 0 0 1 18 0z"></path><circle cx="12" cy="10" r="3"></circle></svg>"#
        );
        Self {
            class_name: "bg-transparent",
            html,
            icon_size: [size, size],
            icon_anchor: [size / 2, size],
        }
    }

    /// Icon for saved entries.
    pub fn entry() -> Self {
        Self::pin(MARKER_FILL, MARKER_SIZE)
    }

    /// Larger, yellow icon for the unsaved marker.
    pub fn pending() -> Self {
        Self::pin(PENDING_MARKER_FILL, PENDING_MARKER_SIZE)
    }
}
