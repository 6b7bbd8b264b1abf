// Application Constants
// Centralized constants to avoid magic numbers

/// Default server configuration
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 4410;
pub const DEFAULT_STATIC_ASSETS_PATH: &str = "frontend/dist";

/// Upstream pharmacy API defaults
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8080";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const UPSTREAM_HEALTH_TIMEOUT_SECS: u64 = 5;
pub const UPSTREAM_API_KEY_HEADER: &str = "x-api-key";

/// Rate limiting for routes that hit the upstream API
pub const UPSTREAM_RATE_LIMIT_PER_MINUTE: u32 = 30;

/// Display precision for computed quantities
pub const DISPLAY_DECIMALS: usize = 2;

/// Differences below this are treated as "lots reconcile" in summaries
pub const LOT_TOTAL_TOLERANCE: f64 = 0.001;

/// GS1 barcode limits
pub const GS1_GROUP_SEPARATOR: char = '\u{1d}';
pub const GS1_MAX_VARIABLE_LENGTH: usize = 20;
pub const MAX_BARCODE_LENGTH: usize = 128;

/// API response messages
pub const MSG_NO_DATA_LOADED: &str = "No inventory data loaded. Reload the screen to fetch data.";
pub const MSG_UPSTREAM_UNAVAILABLE: &str = "Pharmacy API is unavailable";
