// src/main.rs
//! NMEA Monitor - terminal GNSS dashboard fed by NMEA0183 sentences

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use nmea_monitor::{
    config::MonitorConfig,
    display::{
        self,
        terminal::{spawn_key_watcher, TerminalDisplay},
        GpsDisplay,
    },
    error::GpsError,
    web::WebExporter,
    GpsMonitor,
};
use std::{fmt, path::PathBuf, sync::Mutex, time::Duration};
use tokio::io::AsyncRead;
use tracing::{info, warn};

/// Exit code for an input stream that failed or could not be opened.
const EXIT_INPUT: i32 = 1;
/// Exit code for a dashboard or exporter that could not start.
const EXIT_RENDERER: i32 = 2;

#[derive(ValueEnum, Default, PartialEq, Eq, Clone, Copy, Debug)]
enum SourceType {
    File,
    #[default]
    Stdin,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Stdin => f.write_str("stdin"),
        }
    }
}

/// Live GNSS receiver state from an NMEA0183 sentence stream.
#[derive(Parser, Debug)]
#[command(name = "nmea-monitor", version, about, long_about = None)]
struct Args {
    /// NMEA log or device file; standard input when omitted.
    source: Option<PathBuf>,

    /// Where to read sentences from (defaults to `file` when SOURCE is given).
    #[arg(short = 't', long = "type", value_enum)]
    source_type: Option<SourceType>,

    /// Serve the snapshot as JSON on 127.0.0.1, optionally on PORT.
    #[arg(long, value_name = "PORT", num_args = 0..=1)]
    web: Option<Option<u16>>,

    /// No dashboard; print the final snapshot as JSON on exit.
    #[arg(long)]
    headless: bool,

    /// Age after which a field group is shown as stale (e.g. `5s`).
    #[arg(long, value_parser = humantime::parse_duration)]
    staleness: Option<Duration>,

    /// How long an unfinished GSV group may wait for its remaining sentences.
    #[arg(long, value_parser = humantime::parse_duration)]
    gsv_timeout: Option<Duration>,

    /// Dashboard redraw interval when no new snapshot arrives.
    #[arg(long, value_parser = humantime::parse_duration)]
    refresh: Option<Duration>,

    /// Configuration file (default: ~/.config/nmea-monitor/config.json).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let code = match run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<GpsError>() {
        Some(GpsError::Renderer(_)) => EXIT_RENDERER,
        _ => EXIT_INPUT,
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    init_logging(&args)?;
    let config = load_config(&args)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(run_monitor(&args, config));
    // A blocking stdin read may still be parked; do not wait for it.
    runtime.shutdown_background();
    result
}

/// Logs go to `--log-file` when given, otherwise to stderr in headless mode
/// only. The dashboard owns the terminal.
fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .init();
        info!(path = %path.display(), "file logging enabled");
    } else if args.headless {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring default config file");
            MonitorConfig::default()
        }),
    };

    if let Some(threshold) = args.staleness {
        config.update_staleness(threshold);
    }
    if let Some(timeout) = args.gsv_timeout {
        config.update_gsv_timeout(timeout);
    }
    if let Some(interval) = args.refresh {
        config.update_refresh(interval);
    }
    if let Some(Some(port)) = args.web {
        config.web_port = port;
    }

    config.validate()?;
    Ok(config)
}

async fn open_source(args: &Args) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    let source_type = args.source_type.unwrap_or(if args.source.is_some() {
        SourceType::File
    } else {
        SourceType::Stdin
    });

    match (source_type, &args.source) {
        (SourceType::File, Some(path)) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(GpsError::InputStream)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            info!(source = %path.display(), "reading from file");
            Ok(Box::new(file))
        }
        (SourceType::File, None) => bail!("--type file needs a SOURCE path"),
        (SourceType::Stdin, _) => {
            info!(source = %source_type, "reading from standard input");
            Ok(Box::new(tokio::io::stdin()))
        }
    }
}

async fn run_monitor(args: &Args, config: MonitorConfig) -> anyhow::Result<()> {
    // Fail before touching the input if the dashboard cannot run.
    let terminal = if args.headless {
        None
    } else {
        let mut terminal = TerminalDisplay::new();
        terminal.start()?;
        Some(terminal)
    };

    let source = open_source(args).await?;
    let monitor = GpsMonitor::new(config.clone());
    let cancel = monitor.cancel_token();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    if terminal.is_some() {
        spawn_key_watcher(cancel.clone());
    }

    let web_task = match args.web {
        Some(_) => {
            let exporter =
                WebExporter::bind(config.web_port, monitor.subscribe(), monitor.diagnostics())
                    .await?;
            Some(tokio::spawn(exporter.serve(cancel.clone())))
        }
        None => None,
    };

    let display_task = terminal.map(|terminal| {
        tokio::spawn(display::run_display(
            terminal,
            monitor.subscribe(),
            monitor.diagnostics(),
            cancel.clone(),
            config.refresh_interval(),
            config.staleness_threshold(),
        ))
    });

    let outcome = monitor.run(source).await;

    if let Some(task) = display_task {
        match task.await {
            Ok(Err(e)) => warn!(error = %e, "display stopped with error"),
            Err(e) => warn!(error = %e, "display task failed"),
            Ok(Ok(())) => {}
        }
    }
    if let Some(task) = web_task {
        if let Err(e) = task.await {
            warn!(error = %e, "web exporter task failed");
        }
    }

    let last = outcome?;
    if args.headless {
        println!("{}", serde_json::to_string(&last)?);
    }
    Ok(())
}
