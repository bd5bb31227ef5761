// src/lib.rs
//! NMEA Monitor Library
//!
//! Reads NMEA0183 sentences from a byte stream, merges them into one current
//! GNSS state and publishes snapshots to a terminal dashboard and an optional
//! local web exporter.

pub mod config;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod gps;
pub mod monitor;
pub mod publisher;
pub mod web;

// Re-export main types for convenience
pub use config::MonitorConfig;
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::{GpsError, ParseError, Result};
pub use gps::data::GnssState;
pub use monitor::GpsMonitor;
pub use publisher::{Publisher, Subscription};
