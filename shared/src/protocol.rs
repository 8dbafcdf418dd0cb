/// Site endpoint exposing its deployed instances
pub const METRICS_PATH: &str = "/metrics";

/// Aggregator endpoint exporting per-service summaries
pub const SYNC_PATH: &str = "/sync";

/// Selector endpoint answering client routing requests
pub const REQUEST_SERVICE_PATH: &str = "/request-service";

/// Header carrying the client's shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Timestamp layout used in every JSON body
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time rendered with [`TIME_FORMAT`]
pub fn format_now() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}
