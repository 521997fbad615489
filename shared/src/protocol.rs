/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Pause between cycles when no valid interval was supplied
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// Connect timeout for a single probe
pub const DEFAULT_PROBE_TIMEOUT_SECS: f64 = 5.0;

/// Granularity of the cancellable inter-cycle pause
pub const DEFAULT_PAUSE_SLICE_MS: u64 = 500;

/// Latency marker shown before a record's first completed cycle
pub const LATENCY_NOT_AVAILABLE: &str = "N/A";
