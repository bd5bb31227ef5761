// src/gps/data.rs
//! GNSS state snapshot and the types it is built from

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// GGA fix quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FixQuality {
    #[default]
    NoFix,
    #[serde(rename = "GPS")]
    Gps,
    #[serde(rename = "DGPS")]
    Dgps,
    #[serde(rename = "PPS")]
    Pps,
    #[serde(rename = "RTK")]
    Rtk,
    #[serde(rename = "FloatRTK")]
    FloatRtk,
    Estimated,
    Manual,
    Simulation,
}

impl FixQuality {
    /// Map the numeric GGA quality code. Codes above 8 are not defined.
    pub fn from_code(code: u8) -> Option<Self> {
        let quality = match code {
            0 => FixQuality::NoFix,
            1 => FixQuality::Gps,
            2 => FixQuality::Dgps,
            3 => FixQuality::Pps,
            4 => FixQuality::Rtk,
            5 => FixQuality::FloatRtk,
            6 => FixQuality::Estimated,
            7 => FixQuality::Manual,
            8 => FixQuality::Simulation,
            _ => return None,
        };
        Some(quality)
    }

    pub fn is_fix(self) -> bool {
        self != FixQuality::NoFix
    }

    /// Get fix type description
    pub fn description(self) -> &'static str {
        match self {
            FixQuality::NoFix => "No fix",
            FixQuality::Gps => "GPS",
            FixQuality::Dgps => "DGPS",
            FixQuality::Pps => "PPS",
            FixQuality::Rtk => "RTK",
            FixQuality::FloatRtk => "Float RTK",
            FixQuality::Estimated => "Estimated",
            FixQuality::Manual => "Manual",
            FixQuality::Simulation => "Simulation",
        }
    }
}

impl fmt::Display for FixQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// GSA navigation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixMode {
    NoFix,
    #[serde(rename = "2D")]
    Fix2D,
    #[serde(rename = "3D")]
    Fix3D,
}

impl FixMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FixMode::NoFix),
            2 => Some(FixMode::Fix2D),
            3 => Some(FixMode::Fix3D),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FixMode::NoFix => "No fix",
            FixMode::Fix2D => "2D fix",
            FixMode::Fix3D => "3D fix",
        }
    }
}

/// Groups of attributes that are refreshed together and aged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldGroup {
    Position,
    Fix,
    Velocity,
    Dop,
    Satellites,
    Time,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 6] = [
        FieldGroup::Position,
        FieldGroup::Fix,
        FieldGroup::Velocity,
        FieldGroup::Dop,
        FieldGroup::Satellites,
        FieldGroup::Time,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldGroup::Position => "position",
            FieldGroup::Fix => "fix",
            FieldGroup::Velocity => "velocity",
            FieldGroup::Dop => "dop",
            FieldGroup::Satellites => "satellites",
            FieldGroup::Time => "time",
        }
    }
}

/// When each field group last received a value from a sentence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdated {
    pub position: Option<DateTime<Utc>>,
    pub fix: Option<DateTime<Utc>>,
    pub velocity: Option<DateTime<Utc>>,
    pub dop: Option<DateTime<Utc>>,
    pub satellites: Option<DateTime<Utc>>,
    pub time: Option<DateTime<Utc>>,
}

impl LastUpdated {
    pub fn get(&self, group: FieldGroup) -> Option<DateTime<Utc>> {
        match group {
            FieldGroup::Position => self.position,
            FieldGroup::Fix => self.fix,
            FieldGroup::Velocity => self.velocity,
            FieldGroup::Dop => self.dop,
            FieldGroup::Satellites => self.satellites,
            FieldGroup::Time => self.time,
        }
    }

    pub fn set(&mut self, group: FieldGroup, at: DateTime<Utc>) {
        let slot = match group {
            FieldGroup::Position => &mut self.position,
            FieldGroup::Fix => &mut self.fix,
            FieldGroup::Velocity => &mut self.velocity,
            FieldGroup::Dop => &mut self.dop,
            FieldGroup::Satellites => &mut self.satellites,
            FieldGroup::Time => &mut self.time,
        };
        *slot = Some(at);
    }
}

/// How a renderer should present a field group's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Never,
    Fresh(Duration),
    Stale(Duration),
}

impl Freshness {
    pub fn is_stale(self) -> bool {
        matches!(self, Freshness::Stale(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SatelliteInfo {
    pub prn: u16,                // Satellite PRN/ID number
    pub elevation: Option<f32>,  // Elevation angle in degrees
    pub azimuth: Option<f32>,    // Azimuth angle in degrees
    pub snr: Option<f32>,        // Signal-to-noise ratio in dB-Hz
    pub used: bool,              // Whether satellite is used in fix
    pub constellation: String,   // GPS, GLONASS, GALILEO, BEIDOU, etc.
    pub talker: String,
}

impl SatelliteInfo {
    pub fn new(prn: u16, talker: &str) -> Self {
        Self {
            prn,
            elevation: None,
            azimuth: None,
            snr: None,
            used: false,
            constellation: Self::determine_constellation(talker, prn).to_string(),
            talker: talker.to_string(),
        }
    }

    /// Constellation from the talker ID, falling back to NMEA PRN ranges for
    /// combined (GN) talkers.
    pub fn determine_constellation(talker: &str, prn: u16) -> &'static str {
        match talker {
            "GP" => return "GPS",
            "GL" => return "GLONASS",
            "GA" => return "GALILEO",
            "GB" | "BD" => return "BEIDOU",
            "GQ" | "QZ" => return "QZSS",
            "GI" => return "NAVIC",
            _ => {}
        }
        match prn {
            1..=32 => "GPS",
            33..=64 => "SBAS",
            65..=96 => "GLONASS",
            120..=158 => "SBAS",
            159..=163 | 201..=263 => "BEIDOU",
            193..=197 => "QZSS",
            301..=336 => "GALILEO",
            _ => "UNKNOWN",
        }
    }

    pub fn signal_strength_description(&self) -> &'static str {
        match self.snr {
            Some(snr) if snr >= 40.0 => "Excellent",
            Some(snr) if snr >= 35.0 => "Good",
            Some(snr) if snr >= 25.0 => "Fair",
            Some(snr) if snr >= 15.0 => "Poor",
            Some(_) => "Very Poor",
            None => "Unknown",
        }
    }
}

/// The single aggregate receiver state published to renderers.
///
/// Only the aggregator builds these; everyone else sees shared immutable copies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GnssState {
    pub fix_quality: FixQuality,
    pub fix_mode: Option<FixMode>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub speed_knots: Option<f64>,
    pub course_degrees: Option<f64>,
    pub magnetic_variation: Option<f64>,
    pub satellites_used: Option<u8>,
    pub satellites_in_view: Vec<SatelliteInfo>,
    #[serde(rename = "incomplete")]
    pub satellites_incomplete: bool,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub pdop: Option<f64>,
    pub utc_timestamp: Option<DateTime<Utc>>,
    pub utc_time: Option<NaiveTime>,
    pub last_updated: LastUpdated,
}

impl GnssState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the state represents a valid position fix
    pub fn has_fix(&self) -> bool {
        self.fix_quality.is_fix() && self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed_knots.map(|knots| knots * 1.852)
    }

    /// Time since the group last received data, as seen at `now`.
    pub fn age(&self, group: FieldGroup, now: DateTime<Utc>) -> Option<Duration> {
        self.last_updated
            .get(group)
            .map(|at| now.signed_duration_since(at).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn freshness(&self, group: FieldGroup, now: DateTime<Utc>, threshold: Duration) -> Freshness {
        match self.age(group, now) {
            None => Freshness::Never,
            Some(age) if age > threshold => Freshness::Stale(age),
            Some(age) => Freshness::Fresh(age),
        }
    }

    /// True when both states carry the same values, ignoring freshness stamps.
    pub fn same_values(&self, other: &GnssState) -> bool {
        self.fix_quality == other.fix_quality
            && self.fix_mode == other.fix_mode
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.altitude_meters == other.altitude_meters
            && self.speed_knots == other.speed_knots
            && self.course_degrees == other.course_degrees
            && self.magnetic_variation == other.magnetic_variation
            && self.satellites_used == other.satellites_used
            && self.satellites_in_view == other.satellites_in_view
            && self.satellites_incomplete == other.satellites_incomplete
            && self.hdop == other.hdop
            && self.vdop == other.vdop
            && self.pdop == other.pdop
            && self.utc_timestamp == other.utc_timestamp
            && self.utc_time == other.utc_time
    }

    /// Format coordinate for display
    pub fn format_coordinate(coord: Option<f64>) -> String {
        match coord {
            Some(val) => format!("{:>12.6}°", val),
            None => "No fix".to_string(),
        }
    }

    /// Format value with unit for display
    pub fn format_value<T: fmt::Display>(value: Option<T>, unit: &str) -> String {
        match value {
            Some(val) => format!("{:>12} {}", val, unit),
            None => "Unknown".to_string(),
        }
    }

    /// Get satellites grouped by constellation
    pub fn satellites_by_constellation(&self) -> BTreeMap<&str, Vec<&SatelliteInfo>> {
        let mut grouped = BTreeMap::new();
        for sat in &self.satellites_in_view {
            grouped
                .entry(sat.constellation.as_str())
                .or_insert_with(Vec::new)
                .push(sat);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_state_is_no_fix() {
        let state = GnssState::new();
        assert_eq!(state.fix_quality, FixQuality::NoFix);
        assert!(!state.has_fix());
        assert!(state.satellites_in_view.is_empty());
        for group in FieldGroup::ALL {
            assert!(state.last_updated.get(group).is_none());
        }
    }

    #[test]
    fn test_fix_quality_codes() {
        assert_eq!(FixQuality::from_code(0), Some(FixQuality::NoFix));
        assert_eq!(FixQuality::from_code(4), Some(FixQuality::Rtk));
        assert_eq!(FixQuality::from_code(8), Some(FixQuality::Simulation));
        assert_eq!(FixQuality::from_code(9), None);
    }

    #[test]
    fn test_freshness_against_threshold() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 23, 12, 0, 0).unwrap();
        let mut state = GnssState::new();
        let threshold = Duration::from_secs(5);

        assert_eq!(state.freshness(FieldGroup::Position, t0, threshold), Freshness::Never);

        state.last_updated.set(FieldGroup::Position, t0);
        let soon = t0 + chrono::Duration::seconds(2);
        let later = t0 + chrono::Duration::seconds(7);
        assert_eq!(
            state.freshness(FieldGroup::Position, soon, threshold),
            Freshness::Fresh(Duration::from_secs(2))
        );
        assert!(state.freshness(FieldGroup::Position, later, threshold).is_stale());
    }

    #[test]
    fn test_same_values_ignores_timestamps() {
        let mut a = GnssState::new();
        a.latitude = Some(48.1);
        let mut b = a.clone();
        b.last_updated.set(FieldGroup::Position, Utc::now());
        assert!(a.same_values(&b));
        b.latitude = Some(48.2);
        assert!(!a.same_values(&b));
    }

    #[test]
    fn test_constellation_from_talker_and_prn() {
        assert_eq!(SatelliteInfo::new(5, "GL").constellation, "GLONASS");
        assert_eq!(SatelliteInfo::new(70, "GN").constellation, "GLONASS");
        assert_eq!(SatelliteInfo::new(12, "GN").constellation, "GPS");
        assert_eq!(SatelliteInfo::new(400, "GN").constellation, "UNKNOWN");
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut state = GnssState::new();
        state.fix_quality = FixQuality::Gps;
        state.altitude_meters = Some(545.4);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["fixQuality"], "GPS");
        assert_eq!(json["altitudeMeters"], 545.4);
        assert_eq!(json["incomplete"], false);
        assert!(json["satellitesInView"].is_array());
        assert!(json["lastUpdated"]["position"].is_null());
    }
}
