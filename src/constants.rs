// Port configuration
pub const DEFAULT_PORT: u16 = 3001;

// Viewport defaults: the whole contiguous US
pub const DEFAULT_CENTER: (f64, f64) = (37.8, -96.9);
pub const DEFAULT_ZOOM: f64 = 4.0;
pub const MIN_ZOOM: f64 = 4.0;
pub const MAX_ZOOM: f64 = 18.0;

// Pan is clamped to this rectangle (southwest, northeast)
pub const MAX_BOUNDS_SOUTH_WEST: (f64, f64) = (24.396308, -125.0);
pub const MAX_BOUNDS_NORTH_EAST: (f64, f64) = (49.384358, -66.93457);
pub const MAX_BOUNDS_VISCOSITY: f64 = 1.0;

// Clicking never flies out further than this
pub const FLY_TO_MIN_ZOOM: f64 = 5.0;

// Fallback wait for the widget's layout pass when it never reports ready
pub const INIT_DELAY_MS: u64 = 200;

// Headless viewport size until the browser reports its container
pub const DEFAULT_VIEWPORT_SIZE: (f64, f64) = (1024.0, 768.0);
pub const TILE_SIZE: f64 = 256.0;

// Marker icons
pub const MARKER_FILL: &str = "#56BC58";
pub const MARKER_SIZE: u32 = 32;
pub const PENDING_MARKER_FILL: &str = "#F2BB05";
pub const PENDING_MARKER_SIZE: u32 = 40;
pub const POPUP_OFFSET: (i32, i32) = (0, -10);

pub const MAP_BACKGROUND: &str = "#242525";
pub const TILE_ATTRIBUTION: &str =
    r#"&copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors"#;
