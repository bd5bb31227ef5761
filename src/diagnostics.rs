// src/diagnostics.rs
//! Counters for non-fatal input conditions

use crate::error::{FramingError, ParseError};
use crate::gps::sentence::{ParsedSentence, Sentence};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

/// Shared by the ingestion stage (writer) and renderers (readers).
#[derive(Debug)]
pub struct Diagnostics {
    lines: AtomicU64,
    sentences: AtomicU64,
    framing_errors: AtomicU64,
    checksum_mismatches: AtomicU64,
    unsupported: AtomicU64,
    field_errors: AtomicU64,
    snapshots: AtomicU64,
    history_len: usize,
    recent: Mutex<VecDeque<String>>,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub lines: u64,
    pub sentences: u64,
    pub framing_errors: u64,
    pub checksum_mismatches: u64,
    pub unsupported: u64,
    pub field_errors: u64,
    pub snapshots: u64,
    pub recent_sentences: Vec<String>,
    pub last_error: Option<String>,
}

impl Diagnostics {
    pub fn new(history_len: usize) -> Self {
        Self {
            lines: AtomicU64::new(0),
            sentences: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            checksum_mismatches: AtomicU64::new(0),
            unsupported: AtomicU64::new(0),
            field_errors: AtomicU64::new(0),
            snapshots: AtomicU64::new(0),
            history_len,
            recent: Mutex::new(VecDeque::with_capacity(history_len)),
            last_error: Mutex::new(None),
        }
    }

    /// Add a raw line to history (keep the last `history_len`)
    pub fn record_line(&self, line: &str) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        if self.history_len == 0 {
            return;
        }
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        if recent.len() == self.history_len {
            recent.pop_front();
        }
        recent.push_back(line.to_string());
    }

    pub fn record_sentence(&self, parsed: &ParsedSentence) {
        self.sentences.fetch_add(1, Ordering::Relaxed);
        if matches!(parsed.sentence, Sentence::Unsupported(_)) {
            self.unsupported.fetch_add(1, Ordering::Relaxed);
        }
        if parsed.malformed_fields > 0 {
            self.field_errors
                .fetch_add(parsed.malformed_fields as u64, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self, error: &ParseError) {
        let counter = match error {
            ParseError::Framing(_) => &self.framing_errors,
            ParseError::ChecksumMismatch { .. } => &self.checksum_mismatches,
            ParseError::Field { .. } => &self.field_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(error.to_string());
    }

    pub fn record_overlength(&self, length: usize, limit: usize) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(ParseError::from(FramingError::Overlength { length, limit }).to_string());
    }

    pub fn record_published(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            sentences: self.sentences.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            checksum_mismatches: self.checksum_mismatches.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            field_errors: self.field_errors.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            recent_sentences: self
                .recent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect(),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    fn set_last_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::nmea::{parse, with_checksum};

    #[test]
    fn test_history_keeps_last_lines() {
        let diagnostics = Diagnostics::new(2);
        for line in ["a", "b", "c"] {
            diagnostics.record_line(line);
        }
        let snap = diagnostics.snapshot();
        assert_eq!(snap.lines, 3);
        assert_eq!(snap.recent_sentences, vec!["b", "c"]);
    }

    #[test]
    fn test_errors_are_counted_by_kind() {
        let diagnostics = Diagnostics::default();
        for line in [
            "garbage",
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48",
        ] {
            diagnostics.record_error(&parse(line).unwrap_err());
        }
        diagnostics.record_overlength(300, 256);

        let parsed = parse(&with_checksum("GPTXT,01,01,02,ANTSTATUS=OK")).unwrap();
        diagnostics.record_sentence(&parsed);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.framing_errors, 2);
        assert_eq!(snap.checksum_mismatches, 1);
        assert_eq!(snap.unsupported, 1);
        assert_eq!(snap.sentences, 1);
        assert!(snap.last_error.unwrap().contains("256"));
    }
}
