#![warn(missing_docs)]
//! Wi-Fi Ledger tracks how long a device stays associated with one named
//! wireless network and how much traffic passes meanwhile, bucketed by
//! calendar day.

pub mod aggregation;
pub mod clock;
pub mod cmd;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod models;
pub mod notification;
pub mod observer;
pub mod persistence;
pub mod settings;
pub mod supervisor;
pub mod test_helpers;
