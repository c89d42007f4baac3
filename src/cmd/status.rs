//! `today` and `status`: the live view of the ledger.

use chrono::{DateTime, FixedOffset};

use crate::{
    ledger::LedgerStatus,
    models::{Settings, UsageTotals, format_bytes},
};

/// One-line summary of today's usage, including the open session.
pub fn render_today(status: &LedgerStatus) -> String {
    let live = UsageTotals { duration_seconds: status.live_today_seconds, ..status.today };
    format!(
        "today: {} connected, {} received, {} sent",
        live.duration_formatted(),
        format_bytes(live.rx_bytes),
        format_bytes(live.tx_bytes),
    )
}

/// Multi-line status report.
pub fn render_status(status: &LedgerStatus, settings: &Settings) -> String {
    let target = if settings.target_network_name.is_empty() {
        "(not set)"
    } else {
        settings.target_network_name.as_str()
    };
    let state = if status.session_open { "connected" } else { "not connected" };

    [
        format!("target network:       {target} ({state})"),
        format!("alerts:               {}", if settings.check_enabled { "on" } else { "off" }),
        render_today(status),
        format!("first connected today: {}", time_or_dash(status.first_connected_today)),
        format!("last connected:       {}", time_or_dash(status.last_connected_at)),
        format!("last disconnected:    {}", time_or_dash(status.last_disconnected_at)),
    ]
    .join("\n")
}

fn time_or_dash(at: Option<DateTime<FixedOffset>>) -> String {
    at.map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> LedgerStatus {
        LedgerStatus {
            session_open: true,
            was_target_connected: true,
            last_connected_at: DateTime::parse_from_rfc3339("2024-05-01T08:30:00+02:00").ok(),
            last_disconnected_at: None,
            first_connected_today: None,
            today: UsageTotals::new(600, 1024, 0),
            live_today_seconds: 3900,
        }
    }

    #[test]
    fn test_render_today_uses_live_duration() {
        assert_eq!(render_today(&status()), "today: 1h 5m connected, 1.00 KB received, 0 B sent");
    }

    #[test]
    fn test_render_status() {
        let settings = Settings {
            check_enabled: true,
            target_network_name: "Office".to_string(),
            webhook_url: None,
        };

        let output = render_status(&status(), &settings);

        assert!(output.contains("Office (connected)"));
        assert!(output.contains("last connected:       2024-05-01 08:30:00"));
        assert!(output.contains("last disconnected:    -"));
    }
}
