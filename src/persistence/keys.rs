//! Fixed key names of the durable namespace.

/// Prefix of the per-day aggregate keys; the suffix is the `YYYY-MM-DD` day key.
pub const DAILY_PREFIX: &str = "daily:";

/// Start of the open session, in epoch milliseconds. Absent when no session
/// is open.
pub const SESSION_CONNECTED_AT: &str = "session:connected_at";
/// Time of the last accounting flush of the open session.
pub const SESSION_LAST_SAMPLE_AT: &str = "session:last_sample_at";
/// Cumulative receive counter observed at the last flush.
pub const SESSION_LAST_RX: &str = "session:last_rx";
/// Cumulative transmit counter observed at the last flush.
pub const SESSION_LAST_TX: &str = "session:last_tx";
/// Last externally observed association flag.
pub const SESSION_WAS_TARGET_CONNECTED: &str = "session:was_target_connected";

/// Prefix of the per-kind throttle state keys.
pub const THROTTLE_PREFIX: &str = "throttle_state:";

/// Time the last session was opened from a non-associated state.
pub const INFO_LAST_CONNECTED_AT: &str = "info:last_connected_at";
/// Time of the last detected disconnect.
pub const INFO_LAST_DISCONNECTED_AT: &str = "info:last_disconnected_at";
/// Time of the first association of the current calendar day.
pub const INFO_FIRST_CONNECTED_TODAY: &str = "info:first_connected_today";

/// Whether alerts are enabled.
pub const SETTINGS_CHECK_ENABLED: &str = "settings:check_enabled";
/// Name of the tracked wireless network.
pub const SETTINGS_TARGET_NETWORK_NAME: &str = "settings:target_network_name";
/// Optional push webhook endpoint.
pub const SETTINGS_WEBHOOK_URL: &str = "settings:webhook_url";

/// Builds the storage key of a day aggregate.
pub fn daily_key(day_key: &str) -> String {
    format!("{DAILY_PREFIX}{day_key}")
}
