// src/gps/gsv.rs
//! Buffering of multi-sentence GSV groups
//!
//! A GSV group spreads the satellites in view over `total` sentences. The
//! buffer collects one pending group per talker and hands it back once the
//! declared count is reached, or marked incomplete once it times out or is
//! superseded by a new group.

use super::data::SatelliteInfo;
use super::sentence::Gsv;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;

/// Upper bound on talkers tracked at once.
pub const MAX_PENDING_TALKERS: usize = 16;
/// Upper bound on satellites held for one group.
pub const MAX_GROUP_SATELLITES: usize = 64;

/// A satellite list ready to be published for one talker.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedGroup {
    pub talker: String,
    pub satellites: Vec<SatelliteInfo>,
    pub incomplete: bool,
}

#[derive(Debug)]
struct PendingGroup {
    total: u8,
    received: BTreeSet<u8>,
    satellites: Vec<SatelliteInfo>,
    started: DateTime<Utc>,
}

impl PendingGroup {
    fn into_completed(self, talker: String, incomplete: bool) -> CompletedGroup {
        CompletedGroup {
            talker,
            satellites: self.satellites,
            incomplete,
        }
    }
}

#[derive(Debug)]
pub struct SatelliteGroupBuffer {
    pending: BTreeMap<String, PendingGroup>,
    timeout: Duration,
}

impl SatelliteGroupBuffer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: BTreeMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pending_talkers(&self) -> usize {
        self.pending.len()
    }

    /// Add one GSV sentence. Returns every group this sentence finished,
    /// including a superseded partial group for the same talker.
    pub fn push(&mut self, talker: &str, gsv: &Gsv, now: DateTime<Utc>) -> Vec<CompletedGroup> {
        let mut done = Vec::new();
        let (Some(total), Some(number)) = (gsv.total_sentences, gsv.sentence_number) else {
            debug!(talker, "GSV without group header ignored");
            return done;
        };
        if total == 0 || number == 0 || number > total {
            debug!(talker, total, number, "GSV with inconsistent group header ignored");
            return done;
        }

        let superseded = self.pending.get(talker).is_some_and(|group| {
            number == 1 || group.total != total || group.received.contains(&number)
        });
        if superseded {
            if let Some(old) = self.pending.remove(talker) {
                debug!(talker, received = old.received.len(), total = old.total, "GSV group superseded");
                done.push(old.into_completed(talker.to_string(), true));
            }
        }

        if !self.pending.contains_key(talker) {
            self.make_room(&mut done);
            self.pending.insert(
                talker.to_string(),
                PendingGroup {
                    total,
                    received: BTreeSet::new(),
                    satellites: Vec::new(),
                    started: now,
                },
            );
        }

        let Some(group) = self.pending.get_mut(talker) else {
            return done;
        };
        group.received.insert(number);
        for sat in &gsv.satellites {
            let mut info = SatelliteInfo::new(sat.prn, talker);
            info.elevation = sat.elevation;
            info.azimuth = sat.azimuth;
            info.snr = sat.snr;
            if let Some(existing) = group.satellites.iter_mut().find(|s| s.prn == sat.prn) {
                *existing = info;
            } else if group.satellites.len() < MAX_GROUP_SATELLITES {
                group.satellites.push(info);
            }
        }

        if group.received.len() == usize::from(group.total) {
            if let Some(group) = self.pending.remove(talker) {
                done.push(group.into_completed(talker.to_string(), false));
            }
        }
        done
    }

    /// Flush every group that has been pending for at least the timeout.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<CompletedGroup> {
        let timeout = self.timeout;
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, group)| {
                now.signed_duration_since(group.started)
                    .to_std()
                    .is_ok_and(|age| age >= timeout)
            })
            .map(|(talker, _)| talker.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|talker| {
                let group = self.pending.remove(&talker)?;
                debug!(talker = %talker, received = group.received.len(), total = group.total, "GSV group timed out");
                Some(group.into_completed(talker, true))
            })
            .collect()
    }

    /// Flush everything still pending, marked incomplete.
    pub fn flush_all(&mut self) -> Vec<CompletedGroup> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(talker, group)| group.into_completed(talker, true))
            .collect()
    }

    fn make_room(&mut self, done: &mut Vec<CompletedGroup>) {
        while self.pending.len() >= MAX_PENDING_TALKERS {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, group)| group.started)
                .map(|(talker, _)| talker.clone());
            let Some(talker) = oldest else { break };
            if let Some(group) = self.pending.remove(&talker) {
                done.push(group.into_completed(talker, true));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::sentence::GsvSatellite;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 23, 12, 0, 0).unwrap()
    }

    fn gsv(total: u8, number: u8, prns: &[u16]) -> Gsv {
        Gsv {
            total_sentences: Some(total),
            sentence_number: Some(number),
            satellites_in_view: Some(12),
            satellites: prns
                .iter()
                .map(|&prn| GsvSatellite {
                    prn,
                    elevation: Some(30.0),
                    azimuth: Some(120.0),
                    snr: Some(40.0),
                })
                .collect(),
        }
    }

    fn prns(group: &CompletedGroup) -> Vec<u16> {
        group.satellites.iter().map(|s| s.prn).collect()
    }

    #[test]
    fn test_group_completes_when_declared_count_reached() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        assert!(buffer.push("GP", &gsv(3, 1, &[1, 2, 3, 4]), t0()).is_empty());
        assert!(buffer.push("GP", &gsv(3, 2, &[5, 6, 7, 8]), t0()).is_empty());
        let done = buffer.push("GP", &gsv(3, 3, &[9, 10, 11, 12]), t0());

        assert_eq!(done.len(), 1);
        assert!(!done[0].incomplete);
        assert_eq!(prns(&done[0]), (1..=12).collect::<Vec<_>>());
        assert_eq!(done[0].satellites[0].constellation, "GPS");
        assert_eq!(buffer.pending_talkers(), 0);
    }

    #[test]
    fn test_partial_group_times_out_incomplete() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        buffer.push("GP", &gsv(3, 1, &[1, 2, 3, 4]), t0());
        buffer.push("GP", &gsv(3, 2, &[5, 6, 7, 8]), t0());

        assert!(buffer.expire(t0() + chrono::Duration::milliseconds(1999)).is_empty());
        let done = buffer.expire(t0() + chrono::Duration::seconds(2));
        assert_eq!(done.len(), 1);
        assert!(done[0].incomplete);
        assert_eq!(prns(&done[0]), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_new_group_supersedes_partial_one() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        buffer.push("GP", &gsv(2, 1, &[1, 2, 3, 4]), t0());
        let done = buffer.push("GP", &gsv(2, 1, &[1, 2, 3, 4]), t0());
        assert_eq!(done.len(), 1);
        assert!(done[0].incomplete);
        assert_eq!(buffer.pending_talkers(), 1);
    }

    #[test]
    fn test_single_sentence_group_and_independent_talkers() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        buffer.push("GP", &gsv(2, 1, &[1, 2, 3, 4]), t0());
        let done = buffer.push("GL", &gsv(1, 1, &[65, 66]), t0());
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].talker, "GL");
        assert_eq!(done[0].satellites[0].constellation, "GLONASS");
        assert_eq!(buffer.pending_talkers(), 1);
    }

    #[test]
    fn test_inconsistent_header_is_ignored() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        assert!(buffer.push("GP", &gsv(2, 3, &[1]), t0()).is_empty());
        assert!(buffer.push("GP", &gsv(0, 0, &[1]), t0()).is_empty());
        assert_eq!(buffer.pending_talkers(), 0);
    }

    #[test]
    fn test_buffer_is_bounded_by_talker_count() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        let mut evicted = Vec::new();
        for i in 0..(MAX_PENDING_TALKERS + 3) {
            let talker = format!("T{i:02}");
            let at = t0() + chrono::Duration::milliseconds(i as i64);
            evicted.extend(buffer.push(&talker, &gsv(2, 1, &[1]), at));
        }
        assert_eq!(buffer.pending_talkers(), MAX_PENDING_TALKERS);
        assert_eq!(evicted.len(), 3);
        assert_eq!(evicted[0].talker, "T00");
        assert!(evicted.iter().all(|g| g.incomplete));
    }

    #[test]
    fn test_flush_all_marks_incomplete() {
        let mut buffer = SatelliteGroupBuffer::new(Duration::from_secs(2));
        buffer.push("GP", &gsv(3, 1, &[1, 2]), t0());
        let done = buffer.flush_all();
        assert_eq!(done.len(), 1);
        assert!(done[0].incomplete);
        assert_eq!(buffer.pending_talkers(), 0);
    }
}
