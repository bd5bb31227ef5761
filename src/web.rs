// src/web.rs
//! Local HTTP exporter for the published snapshot
//!
//! Serves `GET /snapshot.json`, `GET /diagnostics.json` and a Server-Sent
//! Events stream on `GET /events`. Reads only through a [`Subscription`].

use crate::{
    diagnostics::Diagnostics,
    error::{GpsError, Result},
    publisher::Subscription,
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_REQUEST_LINE: u64 = 4096;
const MAX_HEADER_LINES: usize = 64;
const SSE_KEEPALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Snapshot,
    Diagnostics,
    Events,
    NotFound,
    MethodNotAllowed,
    BadRequest,
}

/// Route a request line such as `GET /snapshot.json HTTP/1.1`.
pub fn route(request_line: &str) -> Route {
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Route::BadRequest;
    };
    if method != "GET" {
        return Route::MethodNotAllowed;
    }
    let path = target.split_once('?').map_or(target, |(path, _)| path);
    match path {
        "/snapshot.json" => Route::Snapshot,
        "/diagnostics.json" => Route::Diagnostics,
        "/events" => Route::Events,
        _ => Route::NotFound,
    }
}

fn response(status: &str, content_type: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n{}\r\n{}",
        status,
        content_type,
        body.len(),
        extra_headers,
        body
    )
}

fn json_response(body: &str) -> String {
    response("200 OK", "application/json", "Cache-Control: no-cache\r\n", body)
}

fn error_response(status: &str, extra_headers: &str) -> String {
    response(status, "text/plain; charset=utf-8", extra_headers, &format!("{}\n", status))
}

pub struct WebExporter {
    listener: TcpListener,
    subscription: Subscription,
    diagnostics: Arc<Diagnostics>,
}

impl WebExporter {
    /// Bind to `127.0.0.1:port`. Port 0 picks a free port.
    pub async fn bind(
        port: u16,
        subscription: Subscription,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GpsError::Renderer(format!("Failed to bind web exporter on {}: {}", addr, e)))?;
        Ok(Self {
            listener,
            subscription,
            diagnostics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until cancelled.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "web exporter listening");
        }

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "web client connected");
                    let subscription = self.subscription.clone();
                    let diagnostics = Arc::clone(&self.diagnostics);
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, subscription, diagnostics, cancel).await {
                            debug!(%peer, error = %e, "web client dropped");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        info!("web exporter stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    subscription: Subscription,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request_line = match read_request_head(&mut reader).await? {
        Some(line) => line,
        None => return Ok(()),
    };

    let route = route(&request_line);
    debug!(request = %request_line.trim_end(), ?route, "web request");

    match route {
        Route::Snapshot => {
            let body = serde_json::to_string(&*subscription.latest())?;
            write_half.write_all(json_response(&body).as_bytes()).await?;
        }
        Route::Diagnostics => {
            let body = serde_json::to_string(&diagnostics.snapshot())?;
            write_half.write_all(json_response(&body).as_bytes()).await?;
        }
        Route::Events => {
            stream_events(&mut write_half, subscription, cancel).await?;
        }
        Route::NotFound => {
            write_half.write_all(error_response("404 Not Found", "").as_bytes()).await?;
        }
        Route::MethodNotAllowed => {
            write_half
                .write_all(error_response("405 Method Not Allowed", "Allow: GET\r\n").as_bytes())
                .await?;
        }
        Route::BadRequest => {
            write_half.write_all(error_response("400 Bad Request", "").as_bytes()).await?;
        }
    }

    write_half.shutdown().await
}

/// Read the request line and skip the headers. `None` when the client hung up.
async fn read_request_head<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut request_line = String::new();
    if (&mut *reader).take(MAX_REQUEST_LINE).read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }

    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        let n = (&mut *reader).take(MAX_REQUEST_LINE).read_line(&mut header).await?;
        if n == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }
    Ok(Some(request_line))
}

/// Push the current snapshot, then one event per publication.
async fn stream_events<W>(
    out: &mut W,
    mut subscription: Subscription,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nAccess-Control-Allow-Origin: *\r\nConnection: keep-alive\r\n\r\n",
    )
    .await?;

    let mut state = subscription.latest();
    let mut keepalive = tokio::time::interval(SSE_KEEPALIVE);
    keepalive.tick().await;

    loop {
        let event = format!("event: snapshot\ndata: {}\n\n", serde_json::to_string(&*state)?);
        out.write_all(event.as_bytes()).await?;
        out.flush().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                changed = subscription.changed() => match changed {
                    Some(latest) => {
                        state = latest;
                        break;
                    }
                    None => return Ok(()),
                },
                _ = keepalive.tick() => {
                    out.write_all(b": keep-alive\n\n").await?;
                    out.flush().await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gps::data::{FixQuality, GnssState},
        publisher::Publisher,
    };

    #[test]
    fn test_routes() {
        assert_eq!(route("GET /snapshot.json HTTP/1.1\r\n"), Route::Snapshot);
        assert_eq!(route("GET /snapshot.json?t=1 HTTP/1.1"), Route::Snapshot);
        assert_eq!(route("GET /diagnostics.json HTTP/1.1"), Route::Diagnostics);
        assert_eq!(route("GET /events HTTP/1.1"), Route::Events);
        assert_eq!(route("GET / HTTP/1.1"), Route::NotFound);
        assert_eq!(route("POST /snapshot.json HTTP/1.1"), Route::MethodNotAllowed);
        assert_eq!(route("garbage"), Route::BadRequest);
    }

    async fn start(publisher: &Publisher) -> (SocketAddr, CancellationToken) {
        let exporter = WebExporter::bind(0, publisher.subscribe(), Arc::new(Diagnostics::default()))
            .await
            .unwrap();
        let addr = exporter.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(exporter.serve(cancel.clone()));
        (addr, cancel)
    }

    async fn request(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_snapshot_endpoint_serves_latest_state() {
        let publisher = Publisher::new();
        let (addr, cancel) = start(&publisher).await;

        let mut state = GnssState::default();
        state.fix_quality = FixQuality::Gps;
        state.altitude_meters = Some(545.4);
        publisher.publish(state);

        let response = request(addr, "GET /snapshot.json HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Content-Type: application/json"));
        assert!(response.contains("\"fixQuality\":\"GPS\""));
        assert!(response.contains("\"altitudeMeters\":545.4"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_diagnostics_and_errors() {
        let publisher = Publisher::new();
        let (addr, cancel) = start(&publisher).await;

        let response = request(addr, "GET /diagnostics.json HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("\"checksumMismatches\":0"));

        let response = request(addr, "GET /map HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));

        let response = request(addr, "DELETE /snapshot.json HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"));
        assert!(response.contains("Allow: GET"));
        cancel.cancel();
    }

    async fn next_data<R: tokio::io::AsyncBufRead + Unpin>(lines: &mut tokio::io::Lines<R>) -> String {
        loop {
            let line = lines.next_line().await.unwrap().unwrap();
            if let Some(data) = line.strip_prefix("data: ") {
                return data.to_string();
            }
        }
    }

    #[tokio::test]
    async fn test_event_stream_pushes_publications() {
        let publisher = Publisher::new();
        let (addr, cancel) = start(&publisher).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"GET /events HTTP/1.1\r\nAccept: text/event-stream\r\n\r\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(read_half).lines();

        let initial = next_data(&mut lines).await;
        assert!(initial.contains("\"fixQuality\":\"NoFix\""));

        let mut state = GnssState::default();
        state.fix_quality = FixQuality::Dgps;
        publisher.publish(state);
        let pushed = next_data(&mut lines).await;
        assert!(pushed.contains("\"fixQuality\":\"DGPS\""));

        cancel.cancel();
    }
}
