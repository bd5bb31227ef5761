// src/display/mod.rs
//! Display modules for different interfaces
//!
//! A renderer only ever sees published snapshots. [`run_display`] drives any
//! [`GpsDisplay`] from a [`Subscription`]: it redraws on every publication and
//! on a periodic tick so ages keep counting while the input is quiet.

pub mod terminal;

use crate::{
    diagnostics::{Diagnostics, DiagnosticsSnapshot},
    error::Result,
    gps::data::{FieldGroup, Freshness, GnssState},
    publisher::Subscription,
};
use chrono::{DateTime, Utc};
use std::{io::Write, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a renderer needs for one redraw.
pub struct DisplayFrame<'a> {
    pub state: &'a GnssState,
    pub diagnostics: &'a DiagnosticsSnapshot,
    pub now: DateTime<Utc>,
    pub staleness: Duration,
}

impl DisplayFrame<'_> {
    pub fn freshness(&self, group: FieldGroup) -> Freshness {
        self.state.freshness(group, self.now, self.staleness)
    }

    pub fn is_stale(&self, group: FieldGroup) -> bool {
        self.freshness(group).is_stale()
    }

    /// Short age text for a group, e.g. `1.2s ago` or `12s ago STALE`.
    pub fn age_label(&self, group: FieldGroup) -> String {
        age_label(self.freshness(group))
    }
}

pub fn age_label(freshness: Freshness) -> String {
    match freshness {
        Freshness::Never => "never".to_string(),
        Freshness::Fresh(age) => format!("{:.1}s ago", age.as_secs_f64()),
        Freshness::Stale(age) => format!("{:.0}s ago STALE", age.as_secs_f64()),
    }
}

/// Trait for different display implementations
pub trait GpsDisplay {
    /// Acquire the output resource. Failure here is fatal.
    fn start(&mut self) -> Result<()>;

    fn draw(&mut self, frame: &DisplayFrame<'_>) -> Result<()>;

    /// Restore whatever `start` changed.
    fn finish(&mut self) -> Result<()>;
}

/// Minimal one-line-per-redraw output, used when the dashboard can no longer write.
pub struct LineDisplay<W: Write> {
    out: W,
}

impl<W: Write> LineDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl LineDisplay<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

/// One-line summary of a snapshot.
pub fn summary_line(frame: &DisplayFrame<'_>) -> String {
    let state = frame.state;
    let coord = |value: Option<f64>| match value {
        Some(v) => format!("{:.6}", v),
        None => "-".to_string(),
    };
    let mut line = format!(
        "fix={} lat={} lon={} alt={} sats={}/{}",
        state.fix_quality,
        coord(state.latitude),
        coord(state.longitude),
        state
            .altitude_meters
            .map(|a| format!("{:.1}m", a))
            .unwrap_or_else(|| "-".to_string()),
        state
            .satellites_used
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
        state.satellites_in_view.len(),
    );
    if frame.is_stale(FieldGroup::Position) {
        line.push_str(" STALE");
    }
    line
}

impl<W: Write> GpsDisplay for LineDisplay<W> {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn draw(&mut self, frame: &DisplayFrame<'_>) -> Result<()> {
        writeln!(self.out, "{}", summary_line(frame))?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drive a display until the pipeline shuts down.
///
/// Errors only when the display cannot start. A draw failure mid-run
/// switches to [`LineDisplay`] on stderr and keeps going.
pub async fn run_display<D: GpsDisplay>(
    mut display: D,
    mut subscription: Subscription,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
    refresh: Duration,
    staleness: Duration,
) -> Result<()> {
    display.start()?;
    info!(refresh_ms = refresh.as_millis() as u64, "display started");

    let mut degraded: Option<LineDisplay<std::io::Stderr>> = None;
    let mut interval = tokio::time::interval(refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state = subscription.latest();

    loop {
        let mut closed = false;
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = subscription.changed() => match changed {
                Some(latest) => state = latest,
                None => closed = true,
            },
            _ = interval.tick() => {}
        }

        let counters = diagnostics.snapshot();
        let frame = DisplayFrame {
            state: &state,
            diagnostics: &counters,
            now: Utc::now(),
            staleness,
        };

        let result = match degraded.as_mut() {
            Some(fallback) => fallback.draw(&frame),
            None => display.draw(&frame),
        };
        if let Err(e) = result {
            if degraded.is_none() {
                warn!(error = %e, "display write failed, switching to degraded output");
                if let Err(e) = display.finish() {
                    debug!(error = %e, "display cleanup failed");
                }
                degraded = Some(LineDisplay::stderr());
            } else {
                debug!(error = %e, "degraded output failed");
            }
        }

        if closed {
            break;
        }
    }

    if degraded.is_none() {
        if let Err(e) = display.finish() {
            warn!(error = %e, "display cleanup failed");
        }
    }
    info!("display stopped");
    Ok(())
}
