// src/gps/nmea.rs
//! NMEA sentence parsing
//!
//! `parse` is a pure function of one line: framing, checksum, address split,
//! then a fixed decoder per sentence type.

use super::data::{FixMode, FixQuality};
use super::sentence::{
    Gga, Gll, Gsa, Gsv, GsvSatellite, ParsedSentence, Rmc, Sentence, Status, Vtg, Zda,
};
use crate::error::{FramingError, ParseError};
use chrono::{NaiveDate, NaiveTime};
use std::str::FromStr;

pub const START_MARKER: char = '$';
pub const CHECKSUM_DELIMITER: char = '*';
pub const FIELD_SEPARATOR: char = ',';
/// Talker of vendor sentences such as `$PUBX` or `$PGRME`.
pub const PROPRIETARY_PREFIX: &str = "P";

/// XOR of every payload byte between `$` and `*`.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Parse a single NMEA line into a typed sentence.
pub fn parse(line: &str) -> Result<ParsedSentence, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FramingError::Empty.into());
    }

    let body = line
        .strip_prefix(START_MARKER)
        .ok_or(FramingError::MissingStartMarker)?;
    let (payload, digits) = body
        .rsplit_once(CHECKSUM_DELIMITER)
        .ok_or(FramingError::MissingChecksum)?;

    let expected = parse_checksum_digits(digits)?;
    let computed = checksum(payload.as_bytes());
    if expected != computed {
        return Err(ParseError::ChecksumMismatch {
            expected,
            computed,
            line: line.to_string(),
        });
    }

    let mut parts = payload.split(FIELD_SEPARATOR);
    let address = parts.next().unwrap_or_default();
    let (talker, code) = split_address(address)?;
    if talker == PROPRIETARY_PREFIX {
        return Ok(ParsedSentence {
            talker: talker.to_string(),
            sentence: Sentence::Unsupported(code.to_string()),
            malformed_fields: 0,
        });
    }

    let mut fields = Fields::new(parts.collect());
    let sentence = match code {
        "GGA" => Sentence::Gga(decode_gga(&mut fields)),
        "RMC" => Sentence::Rmc(decode_rmc(&mut fields)),
        "GSA" => Sentence::Gsa(decode_gsa(&mut fields)),
        "GSV" => Sentence::Gsv(decode_gsv(&mut fields)),
        "VTG" => Sentence::Vtg(decode_vtg(&mut fields)),
        "GLL" => Sentence::Gll(decode_gll(&mut fields)),
        "ZDA" => Sentence::Zda(decode_zda(&mut fields)),
        other => Sentence::Unsupported(other.to_string()),
    };

    if fields.malformed > 0 && fields.decoded == 0 {
        return Err(ParseError::Field {
            sentence_type: code.to_string(),
            malformed: fields.malformed,
        });
    }

    Ok(ParsedSentence {
        talker: talker.to_string(),
        sentence,
        malformed_fields: fields.malformed,
    })
}

/// Split `GPGGA` into talker `GP` and type `GGA`, or `PUBX` into `P` and `UBX`.
fn split_address(address: &str) -> Result<(&str, &str), FramingError> {
    let bad = || FramingError::BadAddress(address.to_string());
    if !address.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(bad());
    }
    if let Some(code) = address.strip_prefix(PROPRIETARY_PREFIX) {
        if code.is_empty() {
            return Err(bad());
        }
        return Ok((PROPRIETARY_PREFIX, code));
    }
    if address.len() != 5 || !address.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(bad());
    }
    Ok(address.split_at(2))
}

fn parse_checksum_digits(digits: &str) -> Result<u8, FramingError> {
    let digits = digits.trim_end();
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FramingError::BadChecksumDigits(digits.to_string()));
    }
    u8::from_str_radix(digits, 16).map_err(|_| FramingError::BadChecksumDigits(digits.to_string()))
}

/// Build a complete sentence line from its payload (address and fields, no `$`).
pub fn with_checksum(payload: &str) -> String {
    format!(
        "{}{}{}{:02X}",
        START_MARKER,
        payload,
        CHECKSUM_DELIMITER,
        checksum(payload.as_bytes())
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn max_degrees(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }

    fn degree_digits(self) -> usize {
        match self {
            Axis::Latitude => 2,
            Axis::Longitude => 3,
        }
    }

    fn hemispheres(self) -> (&'static str, &'static str) {
        match self {
            Axis::Latitude => ("N", "S"),
            Axis::Longitude => ("E", "W"),
        }
    }
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere letter to signed decimal degrees.
pub fn parse_coordinate(value: &str, hemisphere: &str, axis: Axis) -> Option<f64> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.len() < 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let split = whole.len() - 2;
    let degrees = if split == 0 {
        0.0
    } else {
        whole[..split].parse::<u16>().ok()? as f64
    };
    let minutes = value[split..].parse::<f64>().ok()?;
    if minutes >= 60.0 {
        return None;
    }

    let magnitude = degrees + minutes / 60.0;
    if magnitude > axis.max_degrees() {
        return None;
    }

    let (positive, negative) = axis.hemispheres();
    match hemisphere {
        h if h == positive => Some(magnitude),
        h if h == negative => Some(-magnitude),
        _ => None,
    }
}

/// Inverse of [`parse_coordinate`], with six decimal places of minutes.
pub fn format_coordinate(degrees: f64, axis: Axis) -> (String, char) {
    let (positive, negative) = axis.hemispheres();
    let hemisphere = if degrees < 0.0 { negative } else { positive };
    let micro_minutes = (degrees.abs() * 60.0 * 1_000_000.0).round() as u64;
    let whole_degrees = micro_minutes / 60_000_000;
    let minutes = (micro_minutes % 60_000_000) as f64 / 1_000_000.0;
    let width = axis.degree_digits();
    (
        format!("{:0width$}{:09.6}", whole_degrees, minutes, width = width),
        hemisphere.chars().next().unwrap_or('N'),
    )
}

/// `hhmmss[.ss]` UTC time of day.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let (hms, fraction) = value.split_once('.').unwrap_or((value, ""));
    if hms.len() != 6
        || !hms.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let hour: u32 = hms[0..2].parse().ok()?;
    let minute: u32 = hms[2..4].parse().ok()?;
    let second: u32 = hms[4..6].parse().ok()?;
    if second >= 60 {
        return None;
    }

    let mut nanos: u32 = 0;
    for (i, digit) in fraction.bytes().take(9).enumerate() {
        nanos += u32::from(digit - b'0') * 10u32.pow(8 - i as u32);
    }
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
}

/// `ddmmyy` UTC date. Two-digit years below 80 are 20xx.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = value[0..2].parse().ok()?;
    let month: u32 = value[2..4].parse().ok()?;
    let yy: i32 = value[4..6].parse().ok()?;
    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// ZDA splits the date across separate day, month and four-digit year fields.
fn parse_calendar_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn parse_status(value: &str) -> Option<Status> {
    match value {
        "A" => Some(Status::Active),
        "V" => Some(Status::Void),
        _ => None,
    }
}

fn parse_single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c),
        _ => None,
    }
}

fn parse_float(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_in_range(value: &str, min: f64, max: f64) -> Option<f32> {
    parse_float(value)
        .filter(|v| (min..=max).contains(v))
        .map(|v| v as f32)
}

/// Field cursor that keeps per-field failures local to the attribute.
struct Fields<'a> {
    values: Vec<&'a str>,
    decoded: usize,
    malformed: usize,
}

impl<'a> Fields<'a> {
    fn new(values: Vec<&'a str>) -> Self {
        Self {
            values,
            decoded: 0,
            malformed: 0,
        }
    }

    fn raw(&self, index: usize) -> &'a str {
        self.values.get(index).copied().unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    /// Empty fields are unknown; present fields either decode or count as malformed.
    fn decode<T>(&mut self, index: usize, f: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = self.raw(index);
        if raw.is_empty() {
            return None;
        }
        self.tally(f(raw))
    }

    fn tally<T>(&mut self, value: Option<T>) -> Option<T> {
        match value {
            Some(v) => {
                self.decoded += 1;
                Some(v)
            }
            None => {
                self.malformed += 1;
                None
            }
        }
    }

    fn number<T: FromStr>(&mut self, index: usize) -> Option<T> {
        self.decode(index, |s| s.parse().ok())
    }

    fn float(&mut self, index: usize) -> Option<f64> {
        self.decode(index, parse_float)
    }

    fn single_char(&mut self, index: usize) -> Option<char> {
        self.decode(index, parse_single_char)
    }

    fn status(&mut self, index: usize) -> Option<Status> {
        self.decode(index, parse_status)
    }

    fn time(&mut self, index: usize) -> Option<NaiveTime> {
        self.decode(index, parse_time)
    }

    fn date(&mut self, index: usize) -> Option<NaiveDate> {
        self.decode(index, parse_date)
    }

    fn coordinate(&mut self, value: usize, hemisphere: usize, axis: Axis) -> Option<f64> {
        let (raw, hemi) = (self.raw(value), self.raw(hemisphere));
        if raw.is_empty() && hemi.is_empty() {
            return None;
        }
        self.tally(parse_coordinate(raw, hemi, axis))
    }

    /// Value field with an E/W direction field; west is negative.
    fn signed_by_direction(&mut self, value: usize, direction: usize) -> Option<f64> {
        let direction = self.raw(direction);
        self.decode(value, |s| {
            let magnitude = parse_float(s)?;
            match direction {
                "E" | "" => Some(magnitude),
                "W" => Some(-magnitude),
                _ => None,
            }
        })
    }
}

fn decode_gga(f: &mut Fields) -> Gga {
    Gga {
        time: f.time(0),
        latitude: f.coordinate(1, 2, Axis::Latitude),
        longitude: f.coordinate(3, 4, Axis::Longitude),
        fix_quality: f.decode(5, |s| s.parse::<u8>().ok().and_then(FixQuality::from_code)),
        satellites_used: f.number(6),
        hdop: f.float(7),
        altitude: f.float(8),
        geoid_separation: f.float(10),
        dgps_age: f.float(12),
        dgps_station: f.number(13),
    }
}

fn decode_rmc(f: &mut Fields) -> Rmc {
    Rmc {
        time: f.time(0),
        status: f.status(1),
        latitude: f.coordinate(2, 3, Axis::Latitude),
        longitude: f.coordinate(4, 5, Axis::Longitude),
        speed_knots: f.float(6),
        course: f.float(7),
        date: f.date(8),
        magnetic_variation: f.signed_by_direction(9, 10),
        mode: f.single_char(11),
    }
}

fn decode_gsa(f: &mut Fields) -> Gsa {
    let selection = f.single_char(0);
    let fix_mode = f.decode(1, |s| s.parse::<u8>().ok().and_then(FixMode::from_code));
    let prns = (2..14).filter_map(|i| f.number::<u16>(i)).collect();
    Gsa {
        selection,
        fix_mode,
        prns,
        pdop: f.float(14),
        hdop: f.float(15),
        vdop: f.float(16),
    }
}

fn decode_gsv(f: &mut Fields) -> Gsv {
    let total_sentences = f.number(0);
    let sentence_number = f.number(1);
    let satellites_in_view = f.number(2);

    // Four fields per satellite; NMEA 4.10 appends a lone signal ID we ignore.
    let slots = f.len().saturating_sub(3) / 4;
    let mut satellites = Vec::with_capacity(slots);
    for slot in 0..slots {
        let base = 3 + slot * 4;
        let Some(prn) = f.number::<u16>(base) else {
            continue;
        };
        satellites.push(GsvSatellite {
            prn,
            elevation: f.decode(base + 1, |s| parse_in_range(s, -90.0, 90.0)),
            azimuth: f.decode(base + 2, |s| parse_in_range(s, 0.0, 360.0)),
            snr: f.decode(base + 3, |s| parse_in_range(s, 0.0, 99.0)),
        });
    }

    Gsv {
        total_sentences,
        sentence_number,
        satellites_in_view,
        satellites,
    }
}

fn decode_vtg(f: &mut Fields) -> Vtg {
    // Pre-2.0 receivers omit the unit letters: course, course, knots, km/h.
    let legacy = !matches!(f.raw(1), "T" | "");
    if legacy {
        return Vtg {
            course_true: f.float(0),
            course_magnetic: f.float(1),
            speed_knots: f.float(2),
            speed_kmh: f.float(3),
            mode: None,
        };
    }
    Vtg {
        course_true: f.float(0),
        course_magnetic: f.float(2),
        speed_knots: f.float(4),
        speed_kmh: f.float(6),
        mode: f.single_char(8),
    }
}

fn decode_gll(f: &mut Fields) -> Gll {
    Gll {
        latitude: f.coordinate(0, 1, Axis::Latitude),
        longitude: f.coordinate(2, 3, Axis::Longitude),
        time: f.time(4),
        status: f.status(5),
        mode: f.single_char(6),
    }
}

fn decode_zda(f: &mut Fields) -> Zda {
    let time = f.time(0);
    let (day, month, year) = (f.raw(1), f.raw(2), f.raw(3));
    let date = if day.is_empty() && month.is_empty() && year.is_empty() {
        None
    } else {
        f.tally(parse_calendar_date(day, month, year))
    };
    Zda {
        time,
        date,
        local_zone_hours: f.number(4),
        local_zone_minutes: f.number(5),
    }
}
