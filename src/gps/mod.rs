// src/gps/mod.rs
//! NMEA0183 ingestion: framing, decoding and state aggregation

pub mod aggregator;
pub mod data;
pub mod gsv;
pub mod nmea;
pub mod reader;
pub mod sentence;

pub use aggregator::Aggregator;
pub use data::{FieldGroup, FixMode, FixQuality, Freshness, GnssState, SatelliteInfo};
pub use sentence::{ParsedSentence, Sentence};
