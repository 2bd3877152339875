//! # Black Magic Probe JTAG Scanner
//!
//! Connects to a Black Magic Probe over its GDB serial port, reports the firmware and protocol
//! version and optionally initializes JTAG or discovers the devices on the scan chain.
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bmp_client::{JtagDevice, transport::Builder};
use clap::{Parser, Subcommand};
use env_logger::Env;

const DEFAULT_TIMEOUT_MS: &str = "500";

#[derive(Subcommand, Eq, PartialEq, Clone, Copy)]
enum Command {
    /// Report firmware and protocol version
    Info,
    /// Switch the probe to JTAG
    Init,
    /// Discover the devices on the JTAG scan chain
    Scan,
}

#[derive(Parser)]
#[command(about = "Black Magic Probe JTAG scan-chain discovery", long_about = None)]
struct Args {
    #[arg(short, long, help = "Serial endpoint of the probe's GDB port")]
    endpoint: Option<PathBuf>,

    #[arg(
        short,
        long,
        help = "Read timeout in milliseconds",
        default_value = DEFAULT_TIMEOUT_MS,
        value_parser = parse_timeout
    )]
    timeout_ms: u64,

    #[clap(subcommand)]
    command: Option<Command>,
}

/// The probe endpoint's timeout is kept in deciseconds, between 0.1 s and 25.5 s
fn parse_timeout(s: &str) -> Result<u64, String> {
    clap_num::number_range(s, 100, 25_500)
}

/// Attempts to automatically find the GDB port of an attached probe
fn probe_endpoint() -> Option<PathBuf> {
    let by_id = Path::new("/dev/serial/by-id");
    for entry in by_id.read_dir().ok()? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        log::debug!("Looking at serial device {}", path.display());
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        // The first interface carries GDB and the remote protocol, the second one is the UART
        if name.contains("Black_Magic_Probe") && name.ends_with("-if00") {
            return Some(path);
        }
    }
    None
}

fn print_devices(devices: &[JtagDevice]) {
    println!("{} devices on the scan chain", devices.len());
    for (index, device) in devices.iter().enumerate() {
        let idcode = device.idcode();
        let manufacturer = idcode
            .manufacturer_name()
            .map(|name| format!(" ({})", name))
            .unwrap_or_else(|| " [unknown]".to_string());
        println!(
            "{}: IDCODE {}, Manufacturer {:#05x}{}, Part Number {:#06x}, Version {}, IR length {}, IR offset {}",
            index,
            idcode,
            idcode.manufacturer_id(),
            manufacturer,
            idcode.part_number(),
            idcode.version(),
            device.ir_len(),
            device.ir_prescan()
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: endpoint={:?}, timeout_ms={}",
        args.endpoint,
        args.timeout_ms
    );

    let endpoint = args.endpoint.or_else(|| {
        let path = probe_endpoint()?;
        log::info!("Auto-detected probe at {}", path.display());
        Some(path)
    });
    let endpoint = match endpoint {
        Some(endpoint) => endpoint,
        None => {
            println!(
                "No probe could be auto detected. Use bmp-probe --endpoint <path> to manually specify the probe's GDB port."
            );
            return Ok(());
        }
    };

    let mut probe = Builder::new()
        .read_timeout(Duration::from_millis(args.timeout_ms))
        .open(&endpoint)?;

    let info = probe.connect()?;
    println!("BMP Firmware Version: {}", info.firmware_version);
    println!("Using Protocol Version {}", info.protocol_version);

    match args.command.unwrap_or(Command::Info) {
        Command::Info => {}
        Command::Init => {
            probe.jtag_init()?;
            println!("JTAG initialized");
        }
        Command::Scan => print_devices(probe.jtag_scan()?),
    }

    log::debug!("Closing {}", probe);
    probe.close();
    Ok(())
}
