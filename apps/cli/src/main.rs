use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use fwlink_core::{
    DeviceReport, FirmwareCatalog, MockSink, Outcome, ResponseFramer, SerialTransport,
    SessionConfig, SimulatedDevice, Status, TransportError, UpdateSession, select_for,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "MCU firmware updater (host side)", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the firmware images found in the firmware directory
    Scan(DirArg),
    /// Show which image would be uploaded to a device
    Select {
        #[command(flatten)]
        dir: DirArg,
        /// Device id as reported by the bootloader (decimal or 0x hex)
        #[arg(long, value_parser = parse_u32)]
        device_id: u32,
    },
    /// Update a device over a serial port
    Flash {
        #[command(flatten)]
        dir: DirArg,
        /// Serial port (e.g. /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: Option<String>,
        #[arg(short, long)]
        baud: Option<u32>,
        /// Give up when the device is silent this long
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Responses are preceded by the module id byte
        #[arg(long)]
        strip_module_id: bool,
    },
    /// Run a full update against the built-in simulated device
    Simulate {
        #[command(flatten)]
        dir: DirArg,
        /// Device id to impersonate; defaults to the first catalog entry's
        #[arg(long, value_parser = parse_u32)]
        device_id: Option<u32>,
        /// Largest image the simulated device accepts
        #[arg(long, default_value_t = 1024 * 1024)]
        max_size: u32,
        /// Make the device ask for this packet index a second time
        #[arg(long)]
        hiccup_at: Option<u32>,
        /// Status byte the device answers StartUpload with
        #[arg(long, value_parser = parse_status)]
        start_status: Option<Status>,
        /// Status byte the device answers FinishUpload with
        #[arg(long, value_parser = parse_status)]
        finish_status: Option<Status>,
    },
    /// Write a default configuration file
    InitConfig {
        #[arg(default_value = "fwlink.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct DirArg {
    /// Firmware directory (overrides the config file)
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_status(s: &str) -> Result<Status, String> {
    let raw = parse_u32(s)?;
    u8::try_from(raw)
        .map(Status::from)
        .map_err(|_| format!("status byte out of range: {}", s))
}

/// Scripted misbehavior for the simulated device.
#[derive(Debug, Default)]
struct DeviceScript {
    hiccup_at: Option<u32>,
    start_status: Option<Status>,
    finish_status: Option<Status>,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Scan(dir) => {
            let catalog = scan(&dir, &config);
            if catalog.is_empty() {
                println!("No firmware images found");
            }
            for entry in catalog.iter() {
                println!("{}: {}", entry.file_name(), entry.info);
            }
            Ok(())
        }
        Commands::Select { dir, device_id } => {
            let catalog = scan(&dir, &config);
            match select_for(&catalog, device_id) {
                Some(entry) => {
                    println!("{} ({} bytes)", entry.path.display(), entry.len());
                    Ok(())
                }
                None => bail!("no firmware for device id {}", device_id),
            }
        }
        Commands::Flash {
            dir,
            port,
            baud,
            timeout_ms,
            strip_module_id,
        } => {
            if let Some(d) = dir.dir {
                config.firmware_dir = d;
            }
            if port.is_some() {
                config.port = port;
            }
            if let Some(b) = baud {
                config.baud_rate = b;
            }
            if let Some(t) = timeout_ms {
                config.response_timeout_ms = t;
            }
            config.strip_module_id |= strip_module_id;
            flash(&config)
        }
        Commands::Simulate {
            dir,
            device_id,
            max_size,
            hiccup_at,
            start_status,
            finish_status,
        } => {
            let catalog = scan(&dir, &config);
            let script = DeviceScript {
                hiccup_at,
                start_status,
                finish_status,
            };
            simulate(catalog, device_id, max_size, script)
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            config.save_to_file(&output)?;
            info!(path = %output.display(), "Wrote configuration");
            Ok(())
        }
    }
}

fn scan(dir: &DirArg, config: &SessionConfig) -> FirmwareCatalog {
    let path: &Path = dir.dir.as_deref().unwrap_or(config.firmware_dir.as_path());
    FirmwareCatalog::scan(path)
}

/// Drive a real device until the upload completes, stalls or goes silent.
fn flash(config: &SessionConfig) -> Result<()> {
    let port_name = config
        .port
        .as_deref()
        .ok_or_else(|| anyhow!("no serial port given (--port or `port` in the config)"))?;

    let port = SerialTransport::open(port_name, config.baud_rate)?;
    let mut session = UpdateSession::open(&config.firmware_dir, &port);
    if session.catalog().is_empty() {
        bail!("no firmware images in {}", config.firmware_dir.display());
    }

    let mut framer = ResponseFramer::new(config.strip_module_id);
    let timeout = config.response_timeout();
    let mut last_answer = Instant::now();

    session.request_device_info();
    while let Some(awaiting) = session.awaiting() {
        framer.push(&port.read_available()?);

        while let Some(frame) = framer.next_frame() {
            last_answer = Instant::now();
            match session.receive_frame(&frame) {
                Outcome::Complete => {
                    info!(port = port.name(), "Device updated and reset");
                    return Ok(());
                }
                Outcome::Stalled(stall) => bail!("device error: {}", stall),
                Outcome::NoMatchingFirmware { device_id } => {
                    bail!("no firmware for device id {}", device_id)
                }
                _ => {}
            }
        }

        if last_answer.elapsed() > timeout {
            warn!(awaiting = %awaiting, pending = framer.pending(), "Device went silent");
            session.reset();
            return Err(TransportError::Timeout {
                timeout_ms: config.response_timeout_ms,
            })
            .with_context(|| format!("waiting for {} answer", awaiting));
        }
    }
    Ok(())
}

/// Run the whole exchange against [`SimulatedDevice`] in memory.
fn simulate(
    catalog: FirmwareCatalog,
    device_id: Option<u32>,
    max_size: u32,
    script: DeviceScript,
) -> Result<()> {
    let device_id = match device_id {
        Some(id) => id,
        None => catalog
            .iter()
            .next()
            .map(|e| e.info.device_id)
            .ok_or_else(|| anyhow!("catalog is empty, nothing to simulate"))?,
    };

    let mut device = SimulatedDevice::new(DeviceReport {
        device_id,
        firmware_max_size: max_size,
        ..Default::default()
    });
    if let Some(index) = script.hiccup_at {
        device = device.with_hiccup_at(index);
    }
    if let Some(status) = script.start_status {
        device = device.with_start_status(status);
    }
    if let Some(status) = script.finish_status {
        device = device.with_finish_status(status);
    }
    let report = device.report();
    info!(
        device_id = format_args!("{:#010x}", report.device_id),
        max_size = report.firmware_max_size,
        "Simulated device ready"
    );

    let sink = MockSink::new();
    let mut session = UpdateSession::new(catalog, sink.clone());
    let mut frames = 0usize;
    let mut last = session.request_device_info();

    loop {
        let writes = sink.take_writes();
        if writes.is_empty() {
            break;
        }
        for frame in writes {
            frames += 1;
            if let Some(answer) = device.handle(&frame) {
                last = session.receive_frame(&answer);
            }
        }
    }

    match (last, device.last_image()) {
        (Outcome::Complete, Some(image)) => {
            info!(frames, size = image.len(), resets = device.reset_count(), "Simulated update complete");
            Ok(())
        }
        (Outcome::Stalled(stall), _) => bail!("simulated device error: {}", stall),
        (Outcome::NoMatchingFirmware { device_id }, _) => {
            bail!("no firmware for device id {}", device_id)
        }
        (other, _) => bail!("simulation ended early: {:?}", other),
    }
}
