//! # Black Magic Probe Client
//!
//! A host-side driver for the Black Magic Probe that drives the probe's JTAG engine through
//! the remote protocol and discovers the devices on a JTAG scan chain.
//!
//! ## Overview
//!
//! A [`Probe`] owns a byte channel ([`transport::Transport`]) and the state of one session:
//! connection status, firmware and protocol version, JTAG initialization and the devices found
//! by the last scan. Each operation is a single request/response exchange; the protocol is
//! strictly half-duplex and nothing is retried.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use bmp_client::Probe;
//! use bmp_client::transport::Config;
//!
//! let mut probe = Probe::open("/dev/ttyACM0", Config::default())?;
//! let info = probe.connect()?;
//! println!("Firmware {}, protocol {}", info.firmware_version, info.protocol_version);
//!
//! for device in probe.jtag_scan()? {
//!     println!("{} IR length {}", device.idcode(), device.ir_len());
//! }
//! ```
//!
//! ## Scan-Chain Discovery
//!
//! [`Probe::jtag_scan`] resets the TAPs, shifts IDCODEs out of the DR chain until the all-ones
//! chain end shows up, then clocks the IR chain bit by bit to recover each device's IR length
//! and offset. See the [`scan`] module for the details. A failed scan always leaves the device
//! list empty.
//!
//! ## Logging
//!
//! This crate uses the `log` crate. Scan phases are logged at `info`, every request and
//! response at `trace`.
//!
//! ## Thread Model
//!
//! A [`Probe`] is a single mutable resource without internal locking. Only one exchange can be
//! in flight; callers that share a probe must serialize access themselves.
use std::{fmt::Display, path::Path};

use bmp_protocol::{Packet, ProtocolVersion, Reply};

pub mod device;
pub mod error;
pub mod scan;
pub mod transport;

pub use device::{IdCode, JtagDevice};
pub use error::{ChainError, ProbeError};

use crate::transport::{Config, SerialTransport, Transport};

/// Firmware and protocol version reported while connecting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeInfo {
    pub firmware_version: String,
    pub protocol_version: ProtocolVersion,
}

/// Mutable state of one probe session.
#[derive(Clone, Debug, Default)]
pub struct ProbeState {
    pub connected: bool,
    pub protocol_version: Option<ProtocolVersion>,
    pub firmware_version: Option<String>,
    pub jtag_initialized: bool,
    /// Devices in scan order. Only populated after a successful scan.
    pub devices: Vec<JtagDevice>,
}

/// A session with a Black Magic Probe.
pub struct Probe<T: Transport> {
    transport: T,
    state: ProbeState,
    read_buffer_len: usize,
}

impl Probe<SerialTransport> {
    /// Opens the serial endpoint in raw mode. Does not talk to the probe yet.
    pub fn open(
        endpoint: impl AsRef<Path>,
        config: Config,
    ) -> Result<Probe<SerialTransport>, ProbeError> {
        let transport = SerialTransport::open(endpoint, &config)?;
        Ok(Probe {
            transport,
            state: ProbeState::default(),
            read_buffer_len: config.read_buffer_len,
        })
    }
}

impl<T: Transport> Probe<T> {
    pub fn new(transport: T) -> Probe<T> {
        Probe {
            transport,
            state: ProbeState::default(),
            read_buffer_len: Config::default().read_buffer_len,
        }
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.state.firmware_version.as_deref()
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.state.protocol_version
    }

    pub fn jtag_initialized(&self) -> bool {
        self.state.jtag_initialized
    }

    /// Devices found by the last successful scan
    pub fn devices(&self) -> &[JtagDevice] {
        &self.state.devices
    }

    /// Releases the channel and forgets the connection, JTAG initialization and scanned devices.
    pub fn close(&mut self) {
        self.transport.close();
        self.state.connected = false;
        self.state.jtag_initialized = false;
        self.state.devices.clear();
    }

    /// Writes the request and performs exactly one bounded read for the response.
    ///
    /// A short write or a read that times out without data fails the exchange.
    pub fn raw_exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, ProbeError> {
        log::trace!(" -> {}", request.escape_ascii());
        let written = self.transport.write(request)?;
        if written != request.len() {
            log::error!("Short write: sent {} of {} bytes", written, request.len());
            return Err(ProbeError::ShortWrite {
                written,
                expected: request.len(),
            });
        }

        let mut response = vec![0; self.read_buffer_len];
        let read = self.transport.read(&mut response)?;
        if read == 0 {
            log::debug!("No response to {}", request.escape_ascii());
            return Err(ProbeError::NoResponse);
        }
        response.truncate(read);
        log::trace!(" <- {}", response.escape_ascii());
        Ok(response)
    }

    /// Sends a packet and decodes the probe's response to it.
    pub fn exchange(&mut self, packet: &Packet) -> Result<Reply, ProbeError> {
        let request = packet.to_bytes()?;
        let response = self.raw_exchange(&request)?;
        packet.parse_response(&response).map_err(|err| {
            log::debug!("Failed to decode {} response: {}", packet.name(), err);
            ProbeError::Decode(err)
        })
    }

    /// Exchanges a packet that only reports success or failure.
    fn exchange_status(&mut self, packet: &Packet) -> Result<(), ProbeError> {
        match self.exchange(packet)? {
            Reply::Status(true) => Ok(()),
            Reply::Status(false) => Err(ProbeError::Rejected(packet.name())),
            reply => Err(ProbeError::UnexpectedReply {
                command: packet.name(),
                reply,
            }),
        }
    }

    fn require_jtag(&self) -> Result<(), ProbeError> {
        if self.state.jtag_initialized {
            Ok(())
        } else {
            Err(ProbeError::NotInitialized)
        }
    }

    /// Synchronises with the probe and returns its firmware version.
    pub fn handshake(&mut self) -> Result<String, ProbeError> {
        match self.exchange(&Packet::Handshake)? {
            Reply::FirmwareVersion(version) => {
                self.state.connected = true;
                self.state.firmware_version = Some(version.clone());
                Ok(version)
            }
            reply => Err(ProbeError::UnexpectedReply {
                command: Packet::Handshake.name(),
                reply,
            }),
        }
    }

    pub fn query_protocol_version(&mut self) -> Result<ProtocolVersion, ProbeError> {
        match self.exchange(&Packet::QueryVersion)? {
            Reply::ProtocolVersion(version) => {
                self.state.protocol_version = Some(version);
                Ok(version)
            }
            reply => Err(ProbeError::UnexpectedReply {
                command: Packet::QueryVersion.name(),
                reply,
            }),
        }
    }

    /// Handshake followed by the protocol version query.
    pub fn connect(&mut self) -> Result<ProbeInfo, ProbeError> {
        let firmware_version = self.handshake()?;
        log::info!("Probe firmware version: {}", firmware_version);
        let protocol_version = self.query_protocol_version().inspect_err(|_| {
            self.state.connected = false;
        })?;
        log::info!("Using protocol version {}", protocol_version);
        Ok(ProbeInfo {
            firmware_version,
            protocol_version,
        })
    }

    /// Switches the probe to JTAG. Subsequent JTAG operations require this to have succeeded.
    pub fn jtag_init(&mut self) -> Result<(), ProbeError> {
        let result = self.exchange_status(&Packet::JtagInit);
        self.state.jtag_initialized = result.is_ok();
        result
    }

    pub fn jtag_reset(&mut self) -> Result<(), ProbeError> {
        self.require_jtag()?;
        self.exchange_status(&Packet::JtagReset)
    }

    /// Clocks `cycles` TMS states out of `states`, LSB first.
    pub fn jtag_tms(&mut self, cycles: u8, states: u8) -> Result<(), ProbeError> {
        self.require_jtag()?;
        self.exchange_status(&Packet::JtagTms { cycles, states })
    }

    /// Shifts `data` through the chain and returns the TDO bits, LSB first.
    pub fn jtag_tdi_tdo(
        &mut self,
        cycles: u8,
        final_tms: bool,
        data: &[u8],
    ) -> Result<Box<[u8]>, ProbeError> {
        self.require_jtag()?;
        let packet = Packet::tdi_tdo(cycles, final_tms, data)?;
        match self.exchange(&packet)? {
            Reply::Data(tdo) => Ok(tdo),
            reply => Err(ProbeError::UnexpectedReply {
                command: packet.name(),
                reply,
            }),
        }
    }

    /// Shifts `data` into the chain, discarding TDO.
    pub fn jtag_tdi(&mut self, cycles: u8, final_tms: bool, data: &[u8]) -> Result<(), ProbeError> {
        self.require_jtag()?;
        self.exchange_status(&Packet::tdi(cycles, final_tms, data)?)
    }

    /// Performs a single TCK cycle and returns the sampled TDO level.
    pub fn jtag_next(&mut self, tms: bool, tdi: bool) -> Result<bool, ProbeError> {
        self.require_jtag()?;
        let packet = Packet::JtagNext { tms, tdi };
        match self.exchange(&packet)? {
            Reply::Tdo(bit) => Ok(bit),
            reply => Err(ProbeError::UnexpectedReply {
                command: packet.name(),
                reply,
            }),
        }
    }
}

impl<T: Transport> Display for Probe<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.state.connected {
            return write!(f, "<BMP Unconnected>");
        }
        write!(f, "<BMP FW: {}", self.firmware_version().unwrap_or("unknown"))?;
        match self.state.protocol_version {
            Some(version) => write!(f, " PROTO: {}>", version),
            None => write!(f, " PROTO: unknown>"),
        }
    }
}
