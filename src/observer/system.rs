//! Linux observer backed by NetworkManager's `nmcli` and `sysinfo` counters.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use sysinfo::Networks;
use tokio::process::Command;

use super::{ConnectivityObserver, Observation, ObserverError, normalize_network_name};
use crate::models::TrafficTotals;

const NMCLI_TIMEOUT: Duration = Duration::from_secs(5);

/// Observer for hosts managed by NetworkManager.
pub struct SystemObserver {
    networks: Mutex<Networks>,
}

impl SystemObserver {
    /// Creates an observer with a freshly enumerated interface list.
    pub fn new() -> Self {
        Self { networks: Mutex::new(Networks::new_with_refreshed_list()) }
    }

    async fn nmcli(args: &[&str]) -> Result<String, ObserverError> {
        let command = format!("nmcli {}", args.join(" "));
        let output = tokio::time::timeout(NMCLI_TIMEOUT, Command::new("nmcli").args(args).output())
            .await
            .map_err(|_| ObserverError::Timeout(command.clone()))?
            .map_err(|e| ObserverError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ObserverError::CommandFailed {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SystemObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectivityObserver for SystemObserver {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn observe(&self) -> Result<Observation, ObserverError> {
        let devices = Self::nmcli(&["-t", "-f", "TYPE,STATE", "device"]).await?;
        if !parse_wifi_active(&devices) {
            return Ok(Observation { wireless_active: false, network_name: None });
        }

        let access_points =
            Self::nmcli(&["-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "--rescan", "no"])
                .await?;
        let network_name = parse_active_ssid(&access_points);
        tracing::debug!(network_name = ?network_name, "Wireless network observed.");
        Ok(Observation { wireless_active: true, network_name })
    }

    fn traffic_totals(&self) -> TrafficTotals {
        let mut networks = self.networks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        networks.refresh_list();
        networks.refresh();

        let mut totals = TrafficTotals::default();
        for (interface_name, data) in networks.list() {
            if interface_name == "lo" {
                continue;
            }
            totals.rx_bytes = totals.rx_bytes.saturating_add(data.total_received());
            totals.tx_bytes = totals.tx_bytes.saturating_add(data.total_transmitted());
        }
        totals
    }
}

/// Splits an `nmcli -t` line into fields, honouring `\:` and `\\` escapes.
fn split_terse_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

/// True if any wifi device reports a connected state.
fn parse_wifi_active(output: &str) -> bool {
    output.lines().any(|line| {
        let fields = split_terse_fields(line);
        matches!(fields.as_slice(), [kind, state, ..] if kind == "wifi" && state.starts_with("connected"))
    })
}

/// Name of the access point flagged active, if any.
fn parse_active_ssid(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let fields = split_terse_fields(line);
        match fields.as_slice() {
            [active, ssid, ..] if active == "yes" => normalize_network_name(ssid),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_terse_fields_unescapes() {
        assert_eq!(split_terse_fields(r"yes:My\:Net"), vec!["yes", "My:Net"]);
        assert_eq!(split_terse_fields(r"no:back\\slash"), vec!["no", r"back\slash"]);
        assert_eq!(split_terse_fields("wifi:connected"), vec!["wifi", "connected"]);
    }

    #[test]
    fn test_parse_wifi_active() {
        let output = "ethernet:connected\nwifi:connected\nloopback:connected (externally)\n";
        assert!(parse_wifi_active(output));

        let output = "ethernet:connected\nwifi:disconnected\n";
        assert!(!parse_wifi_active(output));

        let output = "wifi:connecting (getting IP configuration)\n";
        assert!(!parse_wifi_active(output));
    }

    #[test]
    fn test_parse_active_ssid() {
        let output = "no:Neighbour\nyes:Office\nno:Cafe\n";
        assert_eq!(parse_active_ssid(output), Some("Office".to_string()));

        let output = "no:Neighbour\n";
        assert_eq!(parse_active_ssid(output), None);

        // Hidden network: active but nameless
        let output = "yes:\n";
        assert_eq!(parse_active_ssid(output), None);
    }
}
