//! User settings snapshot read at the start of every check.

use serde::{Deserialize, Serialize};

/// User-editable settings, persisted in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether alerts are raised. Accounting runs regardless.
    pub check_enabled: bool,
    /// Name of the wireless network being tracked.
    pub target_network_name: String,
    /// Optional push webhook endpoint.
    pub webhook_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { check_enabled: false, target_network_name: String::new(), webhook_url: None }
    }
}
