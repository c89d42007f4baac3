//! Day-bucketed usage totals and their roll-ups.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Association time and traffic credited to one bucket.
///
/// The stored encoding is a JSON object with exactly the fields `d`, `rx`
/// and `tx`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Seconds spent associated with the target network.
    #[serde(rename = "d", default)]
    pub duration_seconds: u64,
    /// Bytes received.
    #[serde(rename = "rx", default)]
    pub rx_bytes: u64,
    /// Bytes transmitted.
    #[serde(rename = "tx", default)]
    pub tx_bytes: u64,
}

impl UsageTotals {
    /// Creates a new set of totals.
    pub fn new(duration_seconds: u64, rx_bytes: u64, tx_bytes: u64) -> Self {
        Self { duration_seconds, rx_bytes, tx_bytes }
    }

    /// Decodes a stored value. Anything that is not a well-formed record
    /// decodes to zero.
    pub fn decode(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, raw, "Malformed day record, treating as zero.");
            Self::default()
        })
    }

    /// Encodes the totals in their stored form.
    pub fn encode(&self) -> String {
        format!(r#"{{"d":{},"rx":{},"tx":{}}}"#, self.duration_seconds, self.rx_bytes, self.tx_bytes)
    }

    /// Returns true if every field is zero.
    pub fn is_zero(&self) -> bool {
        self.duration_seconds == 0 && self.rx_bytes == 0 && self.tx_bytes == 0
    }

    /// Received plus transmitted bytes.
    pub fn total_bytes(&self) -> u64 {
        self.rx_bytes.saturating_add(self.tx_bytes)
    }

    /// Formats the duration as `1h 5m`, or `12m` below one hour.
    pub fn duration_formatted(&self) -> String {
        let hours = self.duration_seconds / 3600;
        let minutes = (self.duration_seconds % 3600) / 60;
        if hours > 0 { format!("{hours}h {minutes}m") } else { format!("{minutes}m") }
    }
}

impl AddAssign for UsageTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.duration_seconds = self.duration_seconds.saturating_add(rhs.duration_seconds);
        self.rx_bytes = self.rx_bytes.saturating_add(rhs.rx_bytes);
        self.tx_bytes = self.tx_bytes.saturating_add(rhs.tx_bytes);
    }
}

/// Formats a byte count with binary units and two decimals above 1 KB.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < MB {
        format!("{:.2} KB", value / KB)
    } else if value < GB {
        format!("{:.2} MB", value / MB)
    } else {
        format!("{:.2} GB", value / GB)
    }
}

/// The totals of a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayRecord {
    /// The `YYYY-MM-DD` day key.
    pub date: String,
    /// Totals credited to that day.
    pub totals: UsageTotals,
}

/// The summed totals of a week or a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSummary {
    /// `YYYY-Www` for weeks, `YYYY-MM` for months, the day key for days.
    pub period: String,
    /// Sum of all day totals in the period.
    pub totals: UsageTotals,
}

impl From<DayRecord> for PeriodSummary {
    fn from(record: DayRecord) -> Self {
        Self { period: record.date, totals: record.totals }
    }
}
