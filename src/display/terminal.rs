// src/display/terminal.rs
//! Terminal-based display implementation

use crate::{
    display::{DisplayFrame, GpsDisplay},
    error::{GpsError, Result},
    gps::data::{FieldGroup, GnssState},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use std::{
    io::{self, Write},
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const RULE_WIDTH: usize = 72;
const KEY_POLL: Duration = Duration::from_millis(200);

/// Esc, `q` and Ctrl+C quit the dashboard. Raw mode swallows SIGINT, so
/// Ctrl+C arrives here as a key.
pub fn is_quit_key(event: &Event) -> bool {
    match event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) => match code {
            KeyCode::Esc | KeyCode::Char('q') => true,
            KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
            _ => false,
        },
        _ => false,
    }
}

/// Watch the keyboard on a blocking thread and cancel on a quit key.
pub fn spawn_key_watcher(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !cancel.is_cancelled() {
            match event::poll(KEY_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    debug!(error = %e, "keyboard unavailable");
                    return;
                }
            }
            match event::read() {
                Ok(ev) if is_quit_key(&ev) => {
                    info!("quit key pressed, shutting down");
                    cancel.cancel();
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "keyboard read failed");
                    return;
                }
            }
        }
    })
}

/// Full-screen dashboard on stdout.
pub struct TerminalDisplay {
    stdout: io::Stdout,
    active: bool,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            active: false,
        }
    }

    /// Render the whole dashboard to any writer.
    pub fn render_dashboard(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        // Header
        queue!(
            out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(RULE_WIDTH)),
            Print("\r\n"),
            Print("NMEA Monitor - GNSS receiver dashboard"),
            Print("\r\n"),
            Print("=".repeat(RULE_WIDTH)),
            Print("\r\n"),
            ResetColor
        )?;

        Self::render_position_section(out, frame)?;
        Self::render_movement_section(out, frame)?;
        Self::render_quality_section(out, frame)?;
        Self::render_satellites_section(out, frame)?;
        Self::render_time_section(out, frame)?;
        Self::render_diagnostics_section(out, frame)?;

        // Footer
        queue!(
            out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(RULE_WIDTH)),
            Print("\r\n"),
            Print("Press Esc or Ctrl+C to exit"),
            Print("\r\n"),
            ResetColor
        )?;

        Ok(())
    }

    /// Section heading with the group's age; stale groups turn red.
    fn render_heading(
        out: &mut impl Write,
        frame: &DisplayFrame<'_>,
        title: &str,
        color: Color,
        group: FieldGroup,
    ) -> Result<()> {
        let age_color = if frame.is_stale(group) {
            Color::Red
        } else {
            Color::DarkGrey
        };
        queue!(
            out,
            SetForegroundColor(color),
            Print(format!("{}:", title)),
            SetForegroundColor(age_color),
            Print(format!("  ({})\r\n", frame.age_label(group))),
            ResetColor
        )?;
        Ok(())
    }

    fn line(out: &mut impl Write, text: String) -> Result<()> {
        queue!(out, Print(text), Print("\r\n"))?;
        Ok(())
    }

    fn render_position_section(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        let data = frame.state;
        Self::render_heading(out, frame, "POSITION", Color::Yellow, FieldGroup::Position)?;
        Self::line(out, format!("  Latitude:  {}", GnssState::format_coordinate(data.latitude)))?;
        Self::line(out, format!("  Longitude: {}", GnssState::format_coordinate(data.longitude)))?;
        Self::line(out, format!("  Altitude:  {}", GnssState::format_value(data.altitude_meters, "m")))?;
        Self::line(out, String::new())
    }

    fn render_movement_section(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        let data = frame.state;
        Self::render_heading(out, frame, "MOVEMENT", Color::Cyan, FieldGroup::Velocity)?;
        Self::line(
            out,
            format!(
                "  Speed:     {}",
                GnssState::format_value(data.speed_knots.map(|s| format!("{:.1}", s)), "kn")
            ),
        )?;
        Self::line(
            out,
            format!(
                "             {}",
                GnssState::format_value(data.speed_kmh().map(|s| format!("{:.1}", s)), "km/h")
            ),
        )?;
        Self::line(
            out,
            format!(
                "  Course:    {}",
                GnssState::format_value(data.course_degrees.map(|c| format!("{:.1}", c)), "°")
            ),
        )?;
        if let Some(variation) = data.magnetic_variation {
            Self::line(out, format!("  Mag. var.: {:>12.1} °", variation))?;
        }
        Self::line(out, String::new())
    }

    fn render_quality_section(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        let data = frame.state;
        Self::render_heading(out, frame, "QUALITY", Color::Magenta, FieldGroup::Fix)?;
        Self::line(out, format!("  Fix Type:   {:>12}", data.fix_quality.description()))?;
        Self::line(
            out,
            format!(
                "  Fix Mode:   {:>12}",
                data.fix_mode.map(|m| m.description()).unwrap_or("Unknown")
            ),
        )?;
        Self::line(out, format!("  Satellites: {}", GnssState::format_value(data.satellites_used, "")))?;

        let dop_stale = if frame.is_stale(FieldGroup::Dop) {
            " STALE"
        } else {
            ""
        };
        let dop = |value: Option<f64>| value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string());
        Self::line(
            out,
            format!(
                "  DOP:        H {}  V {}  P {}{}",
                dop(data.hdop),
                dop(data.vdop),
                dop(data.pdop),
                dop_stale
            ),
        )?;
        Self::line(out, String::new())
    }

    fn render_satellites_section(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        let data = frame.state;
        Self::render_heading(out, frame, "SATELLITES", Color::Blue, FieldGroup::Satellites)?;

        if data.satellites_in_view.is_empty() {
            return Self::line(out, "  No satellites in view\r\n".to_string());
        }

        let mut summary: Vec<String> = data
            .satellites_by_constellation()
            .iter()
            .map(|(name, sats)| format!("{} {}", name, sats.len()))
            .collect();
        if data.satellites_incomplete {
            summary.push("incomplete".to_string());
        }
        Self::line(out, format!("  In view: {}  [{}]", data.satellites_in_view.len(), summary.join(", ")))?;
        Self::line(out, "  PRN  CONST      ELEV   AZIM    SNR  SIGNAL     USED".to_string())?;

        let num = |value: Option<f32>| value.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "-".to_string());
        for sat in &data.satellites_in_view {
            Self::line(
                out,
                format!(
                    "  {:>3}  {:<9} {:>5}  {:>5}  {:>5}  {:<10} {}",
                    sat.prn,
                    sat.constellation,
                    num(sat.elevation),
                    num(sat.azimuth),
                    num(sat.snr),
                    sat.signal_strength_description(),
                    if sat.used { "*" } else { "" }
                ),
            )?;
        }
        Self::line(out, String::new())
    }

    fn render_time_section(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        let data = frame.state;
        Self::render_heading(out, frame, "TIME", Color::White, FieldGroup::Time)?;

        let utc = match (data.utc_timestamp, data.utc_time) {
            (Some(ts), _) => ts.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
            (None, Some(time)) => format!("{} UTC (no date)", time.format("%H:%M:%S%.3f")),
            (None, None) => "No time received".to_string(),
        };
        Self::line(out, format!("  UTC:        {}", utc))?;
        Self::line(out, String::new())
    }

    fn render_diagnostics_section(out: &mut impl Write, frame: &DisplayFrame<'_>) -> Result<()> {
        let diag = frame.diagnostics;
        queue!(
            out,
            SetForegroundColor(Color::DarkCyan),
            Print("DIAGNOSTICS:\r\n"),
            ResetColor
        )?;
        Self::line(
            out,
            format!(
                "  Lines {}  Sentences {}  Snapshots {}",
                diag.lines, diag.sentences, diag.snapshots
            ),
        )?;
        Self::line(
            out,
            format!(
                "  Framing {}  Checksum {}  Unsupported {}  Field {}",
                diag.framing_errors, diag.checksum_mismatches, diag.unsupported, diag.field_errors
            ),
        )?;
        if let Some(error) = &diag.last_error {
            queue!(
                out,
                SetForegroundColor(Color::Red),
                Print(format!("  Last error: {}\r\n", error)),
                ResetColor
            )?;
        }

        let raw_display = if diag.recent_sentences.is_empty() {
            vec!["No data".to_string()]
        } else {
            diag.recent_sentences.clone()
        };
        for raw in raw_display {
            Self::line(out, format!("  {}", raw))?;
        }
        Self::line(out, String::new())
    }
}

impl GpsDisplay for TerminalDisplay {
    fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        if !self.stdout.is_tty() {
            return Err(GpsError::Renderer(
                "stdout is not a terminal; use --headless".to_string(),
            ));
        }
        execute!(self.stdout, EnterAlternateScreen, Hide, DisableLineWrap)
            .map_err(|e| GpsError::Renderer(format!("cannot set up terminal: {}", e)))?;
        self.active = true;
        terminal::enable_raw_mode()
            .map_err(|e| GpsError::Renderer(format!("cannot enable raw mode: {}", e)))?;
        Ok(())
    }

    fn draw(&mut self, frame: &DisplayFrame<'_>) -> Result<()> {
        let mut out = self.stdout.lock();
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        Self::render_dashboard(&mut out, frame)?;
        out.flush().map_err(GpsError::Io)
    }

    fn finish(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let raw = terminal::disable_raw_mode();
        execute!(self.stdout, Show, EnableLineWrap, LeaveAlternateScreen)?;
        raw?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
