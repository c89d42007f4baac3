//! The check engine: alert decisions and the check entry point.

pub mod alert_policy;
pub mod check;
