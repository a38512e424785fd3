use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use elan_core::events::{ElanEvent, ElanObserver, TracingObserver};
use elan_core::session::{ElanDevice, SessionConfig};
use elan_core::transport::{NusbTransport, UsbTransport};
use elan_core::{DRIVER_INFO, FrameStats};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Elan fingerprint capture tool (Pure Rust)", long_about = None)]
struct Args {
    /// Path to a TOML session config
    #[arg(long)]
    config: Option<PathBuf>,

    /// USB vendor ID (hex)
    #[arg(long, value_parser = parse_hex)]
    vid: Option<u16>,

    /// USB product ID (hex)
    #[arg(long, value_parser = parse_hex)]
    pid: Option<u16>,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Save frames as PNG into this directory
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Only save frames with a finger present
    #[arg(long)]
    finger_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_hex(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{}': {}", s, e))
}

/// Logs every event and forwards it to the main thread.
struct ChannelObserver {
    tx: Mutex<Sender<ElanEvent>>,
}

impl ElanObserver for ChannelObserver {
    fn on_event(&self, event: &ElanEvent) {
        TracingObserver.on_event(event);
        if matches!(event, ElanEvent::Packet { .. } | ElanEvent::StepEntered { .. }) {
            return;
        }
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event.clone());
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(driver = DRIVER_INFO.full_name, "Starting elan capture tool (nusb backend)...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(vid) = args.vid {
        config.vendor_id = vid;
    }
    if let Some(pid) = args.pid {
        config.product_id = pid;
    }
    if args.frames.is_some() {
        config.frames = args.frames;
    }
    if args.output_dir.is_some() {
        config.output_dir = args.output_dir.clone();
    }
    config.finger_only |= args.finger_only;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    if !DRIVER_INFO.supports(config.vendor_id, config.product_id) {
        warn!(
            vid = %format!("{:04X}", config.vendor_id),
            pid = %format!("{:04X}", config.product_id),
            "Device is not in the driver id table"
        );
    }

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir))?;
    }

    let transport = NusbTransport::open_with_ids(config.vendor_id, config.product_id)?;
    let (tx, rx) = mpsc::channel();
    let observer = Arc::new(ChannelObserver { tx: Mutex::new(tx) });

    let mut device = ElanDevice::with_observer(transport, observer);
    device.open()?;
    device.activate()?;

    let result = capture_loop(&mut device, &rx, &config).map(|frames| {
        info!(frames, "Capture finished");
    });

    // Stops a loop that is still running after an early return.
    let closed = device.close();
    result?;
    closed?;
    Ok(())
}

/// Handle session events until the loop stops. Returns the number of frames kept.
fn capture_loop<T: UsbTransport, O: ElanObserver>(
    device: &mut ElanDevice<T, O>,
    rx: &Receiver<ElanEvent>,
    config: &SessionConfig,
) -> Result<u64> {
    let mut captured: u64 = 0;
    let mut finger_present = false;
    let mut stopping = false;

    loop {
        let event = rx.recv().context("capture thread went away")?;
        match event {
            // The cycle in flight when the limit was hit still reports.
            ElanEvent::FingerStatus { .. } | ElanEvent::ImageCaptured { .. } if stopping => {}
            ElanEvent::FingerStatus { present } => finger_present = present,
            ElanEvent::ImageCaptured { image } => {
                captured += 1;
                let stats = FrameStats::from_frame(image.data());
                info!(
                    frame = captured,
                    finger = finger_present,
                    min = stats.min,
                    max = stats.max,
                    thres = %format!("{:.1}%", stats.above_threshold_pct),
                    "Frame"
                );

                if let Some(dir) = &config.output_dir
                    && (finger_present || !config.finger_only)
                {
                    let path = PathBuf::from(dir).join(format!("frame_{:05}.png", captured));
                    image
                        .standardized()
                        .save(&path)
                        .with_context(|| format!("saving {}", path.display()))?;
                }

                if config.frames.is_some_and(|n| captured >= n) {
                    info!(frames = captured, "Frame limit reached, deactivating");
                    stopping = true;
                    device.deactivate();
                }
            }
            ElanEvent::DeactivateComplete => return Ok(captured),
            ElanEvent::SessionError { code, message } => {
                return Err(anyhow!("session error {}: {}", code, message));
            }
            _ => {}
        }
    }
}
