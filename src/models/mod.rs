//! This module contains the data models shared by the ledger, the alert
//! policy and the CLI.

pub mod alert;
pub mod session;
pub mod settings;
pub mod usage;

pub use alert::{Alert, AlertKind, ThrottleState};
pub use session::{SessionState, TrafficTotals};
pub use settings::Settings;
pub use usage::{DayRecord, PeriodSummary, UsageTotals, format_bytes};
