// src/gps/aggregator.rs
//! Merges decoded sentences into the single published GNSS state

use super::data::{FieldGroup, FixMode, FixQuality, GnssState, SatelliteInfo};
use super::gsv::{CompletedGroup, SatelliteGroupBuffer, MAX_PENDING_TALKERS};
use super::sentence::{Gga, Gll, Gsa, Rmc, ParsedSentence, Sentence, Status, Vtg, Zda};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

const KMH_PER_KNOT: f64 = 1.852;

/// Sole owner and writer of the GNSS state.
///
/// Each `apply` merges only the attributes the sentence carries, stamps the
/// groups that received data and returns a snapshot when it is worth
/// publishing.
#[derive(Debug)]
pub struct Aggregator {
    state: GnssState,
    satellites: SatelliteGroupBuffer,
    views: BTreeMap<String, SatelliteView>,
    active_prns: BTreeMap<&'static str, Vec<u16>>,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    date_is_new: bool,
    published: Option<GnssState>,
    freshness_refresh: Duration,
}

/// The last published satellite list of one talker.
#[derive(Debug)]
struct SatelliteView {
    group: CompletedGroup,
    updated: DateTime<Utc>,
}

/// Assign an attribute only when the sentence carried a value for it.
fn merge<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

impl Aggregator {
    /// `freshness_refresh` is how old a published stamp may get before an
    /// unchanged but refreshed group is republished anyway.
    pub fn new(gsv_timeout: Duration, freshness_refresh: Duration) -> Self {
        Self {
            state: GnssState::new(),
            satellites: SatelliteGroupBuffer::new(gsv_timeout),
            views: BTreeMap::new(),
            active_prns: BTreeMap::new(),
            date: None,
            time: None,
            date_is_new: false,
            published: None,
            freshness_refresh,
        }
    }

    pub fn state(&self) -> &GnssState {
        &self.state
    }

    /// Merge one decoded sentence.
    pub fn apply(&mut self, parsed: &ParsedSentence, now: DateTime<Utc>) -> Option<GnssState> {
        trace!(talker = %parsed.talker, kind = parsed.sentence.type_code(), "merging sentence");
        match &parsed.sentence {
            Sentence::Gga(gga) => self.merge_gga(gga, now),
            Sentence::Rmc(rmc) => self.merge_rmc(rmc, now),
            Sentence::Gsa(gsa) => self.merge_gsa(&parsed.talker, gsa, now),
            Sentence::Gsv(gsv) => {
                let done = self.satellites.push(&parsed.talker, gsv, now);
                self.install_groups(done, now);
            }
            Sentence::Vtg(vtg) => self.merge_vtg(vtg, now),
            Sentence::Gll(gll) => self.merge_gll(gll, now),
            Sentence::Zda(zda) => self.merge_zda(zda, now),
            Sentence::Unsupported(_) => return None,
        }
        self.publish_if_due(now)
    }

    /// Flush GSV groups whose completion timeout has elapsed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<GnssState> {
        let done = self.satellites.expire(now);
        if done.is_empty() {
            return None;
        }
        self.install_groups(done, now);
        self.publish_if_due(now)
    }

    /// Final flush on shutdown. Always returns a snapshot.
    pub fn finish(&mut self, now: DateTime<Utc>) -> GnssState {
        let pending = self.satellites.flush_all();
        self.install_groups(pending, now);
        self.published = Some(self.state.clone());
        self.state.clone()
    }

    fn stamp(&mut self, group: FieldGroup, now: DateTime<Utc>) {
        self.state.last_updated.set(group, now);
    }

    fn merge_gga(&mut self, gga: &Gga, now: DateTime<Utc>) {
        let s = &mut self.state;
        let mut position = merge(&mut s.latitude, gga.latitude);
        position |= merge(&mut s.longitude, gga.longitude);
        position |= merge(&mut s.altitude_meters, gga.altitude);

        let mut fix = merge(&mut s.satellites_used, gga.satellites_used);
        if let Some(quality) = gga.fix_quality {
            s.fix_quality = quality;
            fix = true;
        }
        let dop = merge(&mut s.hdop, gga.hdop);

        if position {
            self.stamp(FieldGroup::Position, now);
        }
        if fix {
            self.stamp(FieldGroup::Fix, now);
        }
        if dop {
            self.stamp(FieldGroup::Dop, now);
        }
        if let Some(time) = gga.time {
            self.observe_time(time, now);
        }
    }

    fn merge_rmc(&mut self, rmc: &Rmc, now: DateTime<Utc>) {
        if rmc.status != Some(Status::Void) {
            let s = &mut self.state;
            let mut position = merge(&mut s.latitude, rmc.latitude);
            position |= merge(&mut s.longitude, rmc.longitude);
            let mut velocity = merge(&mut s.speed_knots, rmc.speed_knots);
            velocity |= merge(&mut s.course_degrees, rmc.course);
            velocity |= merge(&mut s.magnetic_variation, rmc.magnetic_variation);
            if position {
                self.stamp(FieldGroup::Position, now);
            }
            if velocity {
                self.stamp(FieldGroup::Velocity, now);
            }
        }
        if let Some(date) = rmc.date {
            self.observe_date(date);
        }
        if let Some(time) = rmc.time {
            self.observe_time(time, now);
        }
    }

    fn merge_gsa(&mut self, talker: &str, gsa: &Gsa, now: DateTime<Utc>) {
        let s = &mut self.state;
        let mut fix = false;
        if let Some(mode) = gsa.fix_mode {
            s.fix_mode = Some(mode);
            // GSA carries only fix or no fix, not the GGA quality indicator,
            // so a 2D/3D mode keeps whatever fix quality GGA last reported.
            match mode {
                FixMode::NoFix => s.fix_quality = FixQuality::NoFix,
                FixMode::Fix2D | FixMode::Fix3D if !s.fix_quality.is_fix() => {
                    s.fix_quality = FixQuality::Gps
                }
                _ => {}
            }
            fix = true;
        }
        let mut dop = merge(&mut s.pdop, gsa.pdop);
        dop |= merge(&mut s.hdop, gsa.hdop);
        dop |= merge(&mut s.vdop, gsa.vdop);

        if fix {
            self.stamp(FieldGroup::Fix, now);
        }
        if dop {
            self.stamp(FieldGroup::Dop, now);
        }

        if gsa.fix_mode.is_some() || !gsa.prns.is_empty() {
            let first = gsa.prns.first().copied().unwrap_or_default();
            let constellation = SatelliteInfo::determine_constellation(talker, first);
            self.active_prns.insert(constellation, gsa.prns.clone());
            self.rebuild_satellites();
        }
    }

    fn merge_vtg(&mut self, vtg: &Vtg, now: DateTime<Utc>) {
        if vtg.mode == Some('N') {
            return;
        }
        let s = &mut self.state;
        let speed = vtg
            .speed_knots
            .or_else(|| vtg.speed_kmh.map(|kmh| kmh / KMH_PER_KNOT));
        let mut velocity = merge(&mut s.speed_knots, speed);
        velocity |= merge(&mut s.course_degrees, vtg.course_true);
        if velocity {
            self.stamp(FieldGroup::Velocity, now);
        }
    }

    fn merge_gll(&mut self, gll: &Gll, now: DateTime<Utc>) {
        if gll.status != Some(Status::Void) {
            let s = &mut self.state;
            let mut position = merge(&mut s.latitude, gll.latitude);
            position |= merge(&mut s.longitude, gll.longitude);
            if position {
                self.stamp(FieldGroup::Position, now);
            }
        }
        if let Some(time) = gll.time {
            self.observe_time(time, now);
        }
    }

    fn merge_zda(&mut self, zda: &Zda, now: DateTime<Utc>) {
        if let Some(date) = zda.date {
            self.observe_date(date);
        }
        if let Some(time) = zda.time {
            self.observe_time(time, now);
        }
    }

    fn observe_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
        self.date_is_new = true;
    }

    /// Combine the time of day with the latest date, carrying the date
    /// forward and guessing a midnight rollover when time jumps back by
    /// more than half a day without a fresh date.
    fn observe_time(&mut self, time: NaiveTime, now: DateTime<Utc>) {
        if let (Some(previous), Some(date)) = (self.time, self.date) {
            let jumped_back = previous.signed_duration_since(time) > chrono::Duration::hours(12);
            if !self.date_is_new && jumped_back {
                debug!(%previous, %time, "assuming UTC day rollover");
                self.date = date.succ_opt();
            }
        }
        self.time = Some(time);
        self.date_is_new = false;

        self.state.utc_time = Some(time);
        self.state.utc_timestamp = self
            .date
            .map(|date| Utc.from_utc_datetime(&date.and_time(time)));
        self.stamp(FieldGroup::Time, now);
    }

    fn install_groups(&mut self, groups: Vec<CompletedGroup>, now: DateTime<Utc>) {
        if groups.is_empty() {
            return;
        }
        for group in groups {
            debug!(
                talker = %group.talker,
                satellites = group.satellites.len(),
                incomplete = group.incomplete,
                "satellite group published"
            );
            if !self.views.contains_key(&group.talker) {
                self.evict_oldest_view();
            }
            self.views
                .insert(group.talker.clone(), SatelliteView { group, updated: now });
        }
        self.rebuild_satellites();
        self.stamp(FieldGroup::Satellites, now);
    }

    /// Keep at most `MAX_PENDING_TALKERS` talkers in view, dropping the one
    /// heard from least recently.
    fn evict_oldest_view(&mut self) {
        while self.views.len() >= MAX_PENDING_TALKERS {
            let Some(oldest) = self
                .views
                .iter()
                .min_by_key(|(_, view)| view.updated)
                .map(|(talker, _)| talker.clone())
            else {
                return;
            };
            debug!(talker = %oldest, "dropping satellite view of quietest talker");
            self.views.remove(&oldest);
        }
    }

    fn rebuild_satellites(&mut self) {
        let active = &self.active_prns;
        self.state.satellites_in_view = self
            .views
            .values()
            .flat_map(|view| view.group.satellites.iter())
            .map(|sat| {
                let mut sat = sat.clone();
                sat.used = active
                    .get(sat.constellation.as_str())
                    .is_some_and(|prns| prns.contains(&sat.prn));
                sat
            })
            .collect();
        self.state.satellites_incomplete = self.views.values().any(|view| view.group.incomplete);
    }

    fn publish_if_due(&mut self, now: DateTime<Utc>) -> Option<GnssState> {
        let due = match &self.published {
            None => self.state != GnssState::default(),
            Some(previous) => {
                !self.state.same_values(previous) || self.refresh_due(previous, now)
            }
        };
        if !due {
            return None;
        }
        self.published = Some(self.state.clone());
        Some(self.state.clone())
    }

    fn refresh_due(&self, previous: &GnssState, now: DateTime<Utc>) -> bool {
        FieldGroup::ALL.iter().any(|&group| {
            match (previous.last_updated.get(group), self.state.last_updated.get(group)) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(old), Some(new)) => {
                    new > old
                        && now
                            .signed_duration_since(old)
                            .to_std()
                            .is_ok_and(|age| age >= self.freshness_refresh)
                }
            }
        })
    }
}
