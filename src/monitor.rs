// src/monitor.rs
//! Main GPS monitor coordination
//!
//! Reader and parser share one task; decoded sentences travel in arrival
//! order over a bounded channel to the aggregator, which publishes snapshots.

use crate::{
    config::MonitorConfig,
    diagnostics::Diagnostics,
    error::{GpsError, Result},
    gps::{
        aggregator::Aggregator,
        data::GnssState,
        nmea,
        reader::{Frame, LineReader},
        sentence::{ParsedSentence, Sentence},
    },
    publisher::{Publisher, Subscription},
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{
    io::AsyncRead,
    sync::mpsc,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Coordinates the ingestion pipeline and owns its shutdown signal.
pub struct GpsMonitor {
    config: MonitorConfig,
    publisher: Publisher,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
}

impl GpsMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let diagnostics = Arc::new(Diagnostics::new(config.raw_history));
        Self {
            config,
            publisher: Publisher::new(),
            diagnostics,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Read-only access to published snapshots, for renderers and exporters.
    pub fn subscribe(&self) -> Subscription {
        self.publisher.subscribe()
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Token cancelled when the pipeline shuts down, for any reason.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the monitor
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Check if the monitor is running
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Run until end of input, an input stream failure, or cancellation.
    ///
    /// Returns the final snapshot, which is also the last one published.
    pub async fn run<R>(self, source: R) -> Result<GnssState>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let GpsMonitor {
            config,
            publisher,
            diagnostics,
            cancel,
        } = self;

        info!(
            max_line_length = config.max_line_length,
            gsv_timeout_ms = config.gsv_timeout_ms,
            staleness_ms = config.staleness_threshold_ms,
            "monitor started"
        );

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let reader = LineReader::new(source, config.max_line_length);
        let ingest = tokio::spawn(read_sentences(
            reader,
            tx,
            Arc::clone(&diagnostics),
            cancel.clone(),
            config.max_line_length,
        ));

        let aggregator = Aggregator::new(config.gsv_timeout(), config.freshness_refresh());
        let expiry_tick = (config.gsv_timeout() / 4).max(Duration::from_millis(50));
        let final_state = aggregate(
            aggregator,
            rx,
            &publisher,
            &diagnostics,
            cancel.clone(),
            expiry_tick,
        )
        .await;

        // Subscribers see the final snapshot, then the channel closes.
        drop(publisher);
        cancel.cancel();

        match ingest.await {
            Ok(Ok(())) => {
                info!("monitor stopped");
                Ok(final_state)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(GpsError::Other(format!("reader task failed: {}", e))),
        }
    }
}

/// Reader + parser stage. Non-fatal conditions are counted and skipped.
async fn read_sentences<R>(
    mut reader: LineReader<R>,
    tx: mpsc::Sender<ParsedSentence>,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
    limit: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reader cancelled");
                return Ok(());
            }
            frame = reader.next_frame() => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("end of input");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "input stream failed");
                return Err(GpsError::InputStream(e));
            }
        };

        match frame {
            Frame::Overlength { seq, length } => {
                debug!(seq, length, limit, "overlength line discarded");
                diagnostics.record_overlength(length, limit);
            }
            Frame::Line(line) => {
                if line.text.trim().is_empty() {
                    continue;
                }
                diagnostics.record_line(&line.text);
                match nmea::parse(&line.text) {
                    Ok(parsed) => {
                        diagnostics.record_sentence(&parsed);
                        if let Sentence::Unsupported(code) = &parsed.sentence {
                            debug!(seq = line.seq, code = %code, "unsupported sentence type");
                            continue;
                        }
                        if tx.send(parsed).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        debug!(seq = line.seq, kind = err.kind(), error = %err, line = %line.text, "line rejected");
                        diagnostics.record_error(&err);
                    }
                }
            }
        }
    }
}

/// Aggregator stage: sole writer of the state, publishes whole snapshots.
async fn aggregate(
    mut aggregator: Aggregator,
    mut rx: mpsc::Receiver<ParsedSentence>,
    publisher: &Publisher,
    diagnostics: &Diagnostics,
    cancel: CancellationToken,
    expiry_tick: Duration,
) -> GnssState {
    let publish = |state: GnssState| {
        publisher.publish(state);
        diagnostics.record_published();
    };

    let mut interval = tokio::time::interval(expiry_tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            parsed = rx.recv() => match parsed {
                Some(parsed) => {
                    if let Some(state) = aggregator.apply(&parsed, Utc::now()) {
                        publish(state);
                    }
                }
                None => break,
            },
            _ = interval.tick() => {
                if let Some(state) = aggregator.expire(Utc::now()) {
                    publish(state);
                }
            }
            _ = cancel.cancelled() => {
                // Merge what was already queued, then stop.
                rx.close();
                while let Some(parsed) = rx.recv().await {
                    aggregator.apply(&parsed, Utc::now());
                }
                break;
            }
        }
    }

    let last = aggregator.finish(Utc::now());
    publish(last.clone());
    debug!("final snapshot published");
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::FixQuality;
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    struct FailingSource;

    impl AsyncRead for FailingSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone")))
        }
    }

    #[tokio::test]
    async fn test_end_of_input_returns_final_snapshot() {
        let monitor = GpsMonitor::new(MonitorConfig::default());
        let cancel = monitor.cancel_token();
        let input: &'static [u8] =
            b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

        let last = monitor.run(input).await.unwrap();
        assert_eq!(last.fix_quality, FixQuality::Gps);
        assert_eq!(last.altitude_meters, Some(545.4));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_stream_failure_is_fatal() {
        let monitor = GpsMonitor::new(MonitorConfig::default());
        let result = monitor.run(FailingSource).await;
        assert!(matches!(result, Err(GpsError::InputStream(_))));
    }

    #[tokio::test]
    async fn test_stop_flushes_and_returns() {
        let (_writer, source) = tokio::io::duplex(64);
        let monitor = GpsMonitor::new(MonitorConfig::default());
        monitor.stop();
        assert!(!monitor.is_running());
        let last = monitor.run(source).await.unwrap();
        assert_eq!(last, GnssState::default());
    }
}
