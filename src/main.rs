#![forbid(unsafe_code)]

//! `line-device`: line-oriented stream device monitor.
//!
//! Opens the configured transport, prints every parsed message to stdout,
//! forwards stdin lines to the device when it is writable, and closes the
//! device on Ctrl-C / SIGTERM.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use line_device::config::{unescape_separator, DeviceConfig, MonitorConfig, ParserKind, TransportConfig};
use line_device::parser::{JsonParser, MessageParser, TextParser};
use line_device::transport::{FileTransport, TcpTransport, Transport};
use line_device::{AppError, Device, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "line-device", about = "Line-oriented stream device monitor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the incoming message separator (`\n`, `\r\n`, `\t` escapes allowed).
    #[arg(long)]
    separator: Option<String>,

    /// Override the configured parser.
    #[arg(long, value_enum)]
    parser: Option<ParserKind>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("line-device monitor bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));

    // A pending stdin read lives on a blocking thread that never finishes on its own.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = MonitorConfig::load_from_path(&args.config)?;

    if let Some(separator) = args.separator {
        config.device.separator = unescape_separator(&separator);
        config.device.validate()?;
    }
    if let Some(parser) = args.parser {
        config.parser = parser;
    }
    info!(parser = ?config.parser, "configuration loaded");

    let transport = build_transport(&config.transport);
    match config.parser {
        ParserKind::Text => monitor(transport, TextParser, config.device).await,
        ParserKind::Json => monitor(transport, JsonParser, config.device).await,
    }
}

fn build_transport(config: &TransportConfig) -> Box<dyn Transport> {
    match config {
        TransportConfig::Tcp { address } => Box::new(TcpTransport::new(address.clone())),
        TransportConfig::File { path, from_end } => {
            Box::new(FileTransport::new(path.clone()).from_end(*from_end))
        }
    }
}

async fn monitor<P>(transport: Box<dyn Transport>, parser: P, config: DeviceConfig) -> Result<()>
where
    P: MessageParser,
    P::Message: Display,
{
    let device = Arc::new(Device::new(transport, parser, config)?);
    let mut messages = device.subscribe();

    // ── Open device ─────────────────────────────────────
    device.open().await?;
    info!(session_id = ?device.session_id(), writable = device.can_write(), "device open");

    let printer = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            println!("{message}");
        }
    });

    let ct = CancellationToken::new();
    let forwarder = device
        .can_write()
        .then(|| tokio::spawn(forward_stdin(Arc::clone(&device), ct.clone())));

    info!("monitor ready");

    // ── Wait for shutdown signal ────────────────────────
    let signal = shutdown_signal().await;
    info!(signal, "shutdown signal received");
    ct.cancel();

    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }
    if let Err(err) = device.close().await {
        error!(%err, "device close failed");
    }

    // Dropping the device drops the subscriber registry, which ends the printer.
    drop(device);
    let _ = printer.await;
    info!("line-device monitor shut down");

    Ok(())
}

/// Forward stdin lines to the device, terminated by the device's separator.
async fn forward_stdin<P: MessageParser>(device: Arc<Device<P>>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let mut data = line.into_bytes();
                    data.extend_from_slice(device.incoming_message_separator().as_bytes());
                    if let Err(err) = device.write(&data).await {
                        warn!(%err, "write to device failed");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "stdin read failed, no longer forwarding");
                    break;
                }
            },
        }
    }
}

/// Resolve on the first shutdown request and name the signal that caused it.
async fn shutdown_signal() -> &'static str {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(%err, "ctrl-c handler failed, shutting down");
            }
            "ctrl-c"
        }
        () = terminate() => "sigterm",
    }
}

/// SIGTERM on unix; never resolves elsewhere or if the handler cannot be
/// installed.
async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                return;
            }
            Err(err) => warn!(%err, "SIGTERM handler unavailable, only ctrl-c stops the monitor"),
        }
    }

    std::future::pending::<()>().await;
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    // Messages go to stdout; logs go to stderr.
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    installed.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
