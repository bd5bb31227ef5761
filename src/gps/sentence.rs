// src/gps/sentence.rs
//! Typed NMEA0183 sentence records
//!
//! Every attribute is optional: an empty or malformed field decodes to `None`
//! and the rest of the sentence stays usable.

use super::data::{FixMode, FixQuality};
use chrono::{NaiveDate, NaiveTime};

/// A decoded sentence together with its talker and field diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSentence {
    pub talker: String,
    pub sentence: Sentence,
    /// Fields that were present but could not be decoded.
    pub malformed_fields: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Gga(Gga),
    Rmc(Rmc),
    Gsa(Gsa),
    Gsv(Gsv),
    Vtg(Vtg),
    Gll(Gll),
    Zda(Zda),
    Unsupported(String),
}

impl Sentence {
    pub fn type_code(&self) -> &str {
        match self {
            Sentence::Gga(_) => "GGA",
            Sentence::Rmc(_) => "RMC",
            Sentence::Gsa(_) => "GSA",
            Sentence::Gsv(_) => "GSV",
            Sentence::Vtg(_) => "VTG",
            Sentence::Gll(_) => "GLL",
            Sentence::Zda(_) => "ZDA",
            Sentence::Unsupported(code) => code,
        }
    }
}

/// Global Positioning System Fix Data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gga {
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub fix_quality: Option<FixQuality>,
    pub satellites_used: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
    pub geoid_separation: Option<f64>,
    pub dgps_age: Option<f64>,
    pub dgps_station: Option<u16>,
}

/// RMC / GLL data status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Void,
}

/// Recommended Minimum Navigation Information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rmc {
    pub time: Option<NaiveTime>,
    pub status: Option<Status>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_knots: Option<f64>,
    pub course: Option<f64>,
    pub date: Option<NaiveDate>,
    /// Signed, east positive.
    pub magnetic_variation: Option<f64>,
    pub mode: Option<char>,
}

/// GNSS DOP and Active Satellites
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gsa {
    pub selection: Option<char>,
    pub fix_mode: Option<FixMode>,
    pub prns: Vec<u16>,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}

/// One satellite slot of a GSV sentence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GsvSatellite {
    pub prn: u16,
    pub elevation: Option<f32>,
    pub azimuth: Option<f32>,
    pub snr: Option<f32>,
}

/// GNSS Satellites in View
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gsv {
    pub total_sentences: Option<u8>,
    pub sentence_number: Option<u8>,
    pub satellites_in_view: Option<u16>,
    pub satellites: Vec<GsvSatellite>,
}

/// Course Over Ground and Ground Speed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vtg {
    pub course_true: Option<f64>,
    pub course_magnetic: Option<f64>,
    pub speed_knots: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub mode: Option<char>,
}

/// Geographic Position - Latitude/Longitude
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gll {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time: Option<NaiveTime>,
    pub status: Option<Status>,
    pub mode: Option<char>,
}

/// Time & Date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Zda {
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub local_zone_hours: Option<i8>,
    pub local_zone_minutes: Option<u8>,
}
