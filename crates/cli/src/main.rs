//! usb-bridge CLI
//!
//! Opens an interrupt USB device through the bridge, writes hex lines read
//! from stdin to it and prints every inbound frame as hex.

mod config;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{FrameStream, HostEventEmitter, UsbBridge, setup_logging};
use config::{CliConfig, parse_usb_id};
use native::{NativeError, RusbTransport, list_devices};
use protocol::{DecodeMode, decode_hex_strict, encode_hex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

type Bridge = UsbBridge<RusbTransport, HostEventEmitter>;

#[derive(Parser, Debug)]
#[command(name = "usb-bridge")]
#[command(author, version, about = "USB Bridge - Exchange hex frames with an interrupt USB device")]
#[command(long_about = "
Talks to a USB device exposing one interface with an interrupt IN/OUT
endpoint pair. Each line typed on stdin is hex-decoded and written to the
device; each inbound report is printed as a lowercase hex line.

EXAMPLES:
    # List attached devices
    usb-bridge --list-devices

    # Open an Arduino Uno
    usb-bridge --vid 0x2341 --pid 0x0043

    # Accept loosely formatted inbound hex
    usb-bridge --vid 0x2341 --pid 0x0043 --lenient

    # Run with debug logging
    usb-bridge --log-level debug

CONFIGURATION:
    usb-bridge looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-bridge/config.toml
    3. /etc/usb-bridge/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Vendor id (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "ID")]
    vid: Option<String>,

    /// Product id (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "ID")]
    pid: Option<String>,

    /// Decode inbound hex leniently instead of rejecting malformed frames
    #[arg(long)]
    lenient: bool,

    /// List attached USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = CliConfig::default();
        let path = CliConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        CliConfig::load(Some(config::expand_path(path))).context("Failed to load configuration")?
    } else {
        CliConfig::load_or_default()
    };

    if args.lenient {
        config.bridge.decode_mode = DecodeMode::Lenient;
    }

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let events = HostEventEmitter::new();
    let transport = RusbTransport::new(events.clone(), config.native.clone())
        .context("Failed to initialize libusb")?;

    if args.list_devices {
        let devices = list_devices(transport.context()).context("Failed to list USB devices")?;
        if devices.is_empty() {
            println!("No USB devices found");
        }
        for device in devices {
            println!("{}", device);
        }
        return Ok(());
    }

    let (vendor_id, product_id) = resolve_device(&args, &config)?;

    let bridge = UsbBridge::with_settings(transport, events, config.bridge.clone());
    let frames = bridge.frames();

    bridge
        .connect(vendor_id, product_id)
        .await
        .map_err(|e| anyhow!("[{}] {}", e.code(), e))
        .with_context(|| format!("Failed to open {:04x}:{:04x}", vendor_id, product_id))?;

    info!(
        "Connected to {:04x}:{:04x} (decode mode: {:?})",
        vendor_id,
        product_id,
        bridge.settings().decode_mode
    );

    let result = run_session(&bridge, &frames).await;

    info!("Shutting down...");
    let stats = bridge.stats();
    info!(
        "Frames delivered: {}, rejected: {}",
        stats.frames_delivered, stats.frames_rejected
    );

    match bridge.disconnect().await {
        Ok(()) => {}
        // The device went away on its own
        Err(NativeError::NoConnection) => {}
        Err(e) => warn!("Disconnect failed [{}]: {}", e.code(), e),
    }

    flush_frames(&frames);

    result
}

/// Pick the device from CLI flags first, then the config file
fn resolve_device(args: &Args, config: &CliConfig) -> Result<(u16, u16)> {
    let from_config = config.device.ids()?;

    let vendor_id = match (&args.vid, from_config) {
        (Some(vid), _) => parse_usb_id(vid)?,
        (None, Some((vid, _))) => vid,
        (None, None) => return Err(anyhow!("No vendor id given (use --vid or [device] vendor_id)")),
    };
    let product_id = match (&args.pid, from_config) {
        (Some(pid), _) => parse_usb_id(pid)?,
        (None, Some((_, pid))) => pid,
        (None, None) => {
            return Err(anyhow!("No product id given (use --pid or [device] product_id)"));
        }
    };

    Ok((vendor_id, product_id))
}

/// Pump stdin to the device and frames to stdout until EOF or Ctrl+C
async fn run_session(bridge: &Bridge, frames: &FrameStream) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => println!("< {}", encode_hex(&frame)),
                Err(e) => {
                    warn!("Inbound stream ended: {}", e);
                    break;
                }
            },
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => send_line(bridge, line.trim()).await,
                None => {
                    info!("stdin closed");
                    break;
                }
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C");
                break;
            }
        }
    }

    Ok(())
}

/// Print frames still buffered once the stream has ended
fn flush_frames(frames: &FrameStream) {
    if frames.is_empty() {
        return;
    }

    info!("Flushing {} buffered frames", frames.len());
    while let Some(frame) = frames.try_recv() {
        println!("< {}", encode_hex(&frame));
    }
}

async fn send_line(bridge: &Bridge, line: &str) {
    if line.is_empty() {
        return;
    }

    let data = match decode_hex_strict(line) {
        Ok(data) => data,
        Err(e) => {
            warn!("Ignoring input '{}': {}", line, e);
            return;
        }
    };

    match bridge.write(&data).await {
        Ok(()) => println!("> {}", encode_hex(&data)),
        Err(e) => error!("Write failed [{}]: {}", e.code(), e),
    }
}
