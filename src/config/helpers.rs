use std::time::Duration;

use serde::{Deserialize, Deserializer, de};
use url::Url;

/// Custom deserializer for Duration from seconds
pub fn deserialize_duration_from_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

/// Like [`deserialize_duration_from_seconds`], but rejects zero. Used for
/// intervals that drive a loop.
pub fn deserialize_nonzero_duration_from_seconds<'de, D>(
    deserializer: D,
) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    if secs == 0 {
        return Err(de::Error::custom("interval must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

/// Checks that a webhook endpoint is an absolute http(s) URL. Blank input
/// means "no webhook".
pub fn parse_webhook_url(raw: &str) -> Result<Option<String>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let url = Url::parse(trimmed).map_err(|e| format!("invalid webhook URL '{trimmed}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url.to_string())),
        other => Err(format!("unsupported webhook URL scheme '{other}'")),
    }
}

/// Custom deserializer for an optional webhook URL, mapping blank strings to
/// `None`.
pub fn deserialize_webhook_url<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(raw) => parse_webhook_url(&raw).map_err(de::Error::custom),
        None => Ok(None),
    }
}
