//! # Scan-Chain Discovery
//!
//! Enumerates the TAPs on an unknown JTAG chain in one forward pass:
//!
//! 1. Clear the device list and initialize JTAG if needed
//! 2. Reset all TAPs, which selects IDCODE (or BYPASS) as their data register
//! 3. Enter Shift-DR and shift 32 bit words of ones through the chain. Each word is the IDCODE
//!    of the next device until the ones fed in at TDI come back out (`0xFFFFFFFF`)
//! 4. Return to Run-Test/Idle (best effort) and enter Shift-IR
//! 5. Clock ones through the IR chain one bit at a time. Every IR captures `...01` on its way
//!    into Shift-IR, so each `1` after a run of zeros marks the boundary to the next device, and
//!    two consecutive ones mark the end of the chain
//!
//! The bit-level bookkeeping of step 5 lives in [`IrScanner`] so it can be driven and tested
//! without a probe.
use bmp_protocol::Packet;

use crate::{
    Probe,
    device::JtagDevice,
    error::{ChainError, ProbeError, ScanPhase},
    transport::Transport,
};

/// Upper bound on the bits clocked through the IR chain.
pub const MAX_IR_CHAIN_BITS: usize = 64;

/// Upper bound on the devices read by the IDCODE scan. Every IR is at least two bits in this
/// scheme, so more devices than this could never be resolved.
pub const MAX_CHAIN_DEVICES: usize = MAX_IR_CHAIN_BITS / 2;

/// The value shifted out once the ones fed in at TDI have passed every device.
const IDCODE_CHAIN_END: u32 = 0xFFFF_FFFF;

/// Outcome of feeding one sampled bit to an [`IrScanner`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IrStep {
    /// More bits are needed.
    Continue,
    /// The IR of the device at `index` has been measured.
    Resolved {
        index: usize,
        ir_len: usize,
        ir_prescan: usize,
    },
    /// The IR bit stream of the whole chain has ended.
    Done,
}

/// Splits the IR bit stream of a chain into per-device IR lengths and offsets.
#[derive(Clone, Debug)]
pub struct IrScanner {
    devices: usize,
    ir_len: usize,
    dev_index: usize,
    prescan: usize,
    bits: usize,
    conformant: bool,
}

impl IrScanner {
    /// Creates a scanner for a chain on which the IDCODE scan found `devices` devices.
    pub fn new(devices: usize) -> IrScanner {
        IrScanner {
            devices,
            ir_len: 0,
            dev_index: 0,
            prescan: 0,
            bits: 0,
            conformant: true,
        }
    }

    /// Consumes the next bit sampled on TDO.
    pub fn step(&mut self, bit: bool) -> Result<IrStep, ChainError> {
        if self.ir_len == 0 && !bit {
            log::warn!("Non-conformant JTAG IR!");
            self.conformant = false;
        }

        self.bits += 1;
        self.ir_len += 1;
        log::debug!("ir_len: {}, bit: {}", self.ir_len, bit);

        let step = if !bit || self.ir_len == 1 {
            IrStep::Continue
        } else if self.ir_len == 2 {
            return Ok(IrStep::Done);
        } else {
            if self.dev_index >= self.devices {
                return Err(ChainError::DeviceIndexOverflow {
                    index: self.dev_index,
                    devices: self.devices,
                });
            }
            let ir_len = self.ir_len - 1;
            let step = IrStep::Resolved {
                index: self.dev_index,
                ir_len,
                ir_prescan: self.prescan,
            };
            self.prescan += ir_len;
            self.dev_index += 1;
            // The terminating one is the first bit of the next device's IR
            self.ir_len = 1;
            step
        };

        if self.bits >= MAX_IR_CHAIN_BITS {
            return Err(ChainError::IrScanUnterminated { bits: self.bits });
        }
        Ok(step)
    }

    /// Number of devices whose IR has been measured
    pub fn resolved(&self) -> usize {
        self.dev_index
    }

    /// Combined IR length of the resolved devices
    pub fn total_ir_len(&self) -> usize {
        self.prescan
    }

    /// `false` if the first bit out of the chain was a zero
    pub fn is_conformant(&self) -> bool {
        self.conformant
    }
}

fn to_u32_be(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0, |value, byte| (value << 8) | *byte as u32)
}

fn phase_failed(phase: ScanPhase) -> impl FnOnce(ProbeError) -> ProbeError {
    move |source| ProbeError::Scan {
        phase,
        source: Box::new(source),
    }
}

fn read_failure(source: ProbeError) -> ProbeError {
    ProbeError::Chain(ChainError::ReadFailure(Box::new(source)))
}

impl<T: Transport> Probe<T> {
    /// Discovers the devices on the JTAG chain.
    ///
    /// Initializes JTAG first if that has not happened yet. On success, the returned devices are
    /// also available through [`Probe::devices`]. On failure, the device list is left empty.
    pub fn jtag_scan(&mut self) -> Result<&[JtagDevice], ProbeError> {
        self.state.devices.clear();
        if !self.state.jtag_initialized {
            self.jtag_init().map_err(phase_failed(ScanPhase::Initialize))?;
        }

        match self.scan_chain() {
            Ok(devices) => {
                log::info!("Found {} devices on the scan chain", devices.len());
                self.state.devices = devices;
                Ok(&self.state.devices)
            }
            Err(err) => {
                log::error!("{}", err);
                Err(err)
            }
        }
    }

    fn scan_chain(&mut self) -> Result<Vec<JtagDevice>, ProbeError> {
        log::info!("Resetting JTAG TAPs");
        self.jtag_reset().map_err(phase_failed(ScanPhase::Reset))?;

        log::info!("Changing state to Shift-DR");
        self.exchange_status(&Packet::shift_dr())
            .map_err(phase_failed(ScanPhase::EnterShiftDr))?;

        log::info!("Scanning out ID codes");
        let mut devices = self.scan_idcodes()?;

        log::info!("Returning to Run-Test/Idle");
        if let Err(err) = self
            .jtag_next(true, true)
            .and_then(|_| self.exchange_status(&Packet::return_idle(1)))
        {
            log::error!("Failed to return JTAG state machine to idle: {}", err);
        }

        log::info!("Changing state to Shift-IR");
        self.exchange_status(&Packet::shift_ir())
            .map_err(phase_failed(ScanPhase::EnterShiftIr))?;

        log::info!("Scanning out IRs");
        self.scan_ir_lengths(&mut devices)?;
        Ok(devices)
    }

    fn scan_idcodes(&mut self) -> Result<Vec<JtagDevice>, ProbeError> {
        let mut devices = Vec::new();
        loop {
            let tdo = self
                .jtag_tdi_tdo(32, false, &[0xFF; 4])
                .map_err(read_failure)?;
            let idcode = to_u32_be(&tdo);
            if idcode == IDCODE_CHAIN_END {
                return Ok(devices);
            }
            if devices.len() >= MAX_CHAIN_DEVICES {
                return Err(ChainError::IdcodeScanUnterminated {
                    devices: devices.len(),
                }
                .into());
            }
            let device = JtagDevice::new(idcode);
            if device.idcode().has_marker_bit() {
                log::debug!("Found IDCODE {}", device.idcode());
            } else {
                log::warn!("IDCODE {} has bit 0 clear", device.idcode());
            }
            devices.push(device);
        }
    }

    fn scan_ir_lengths(&mut self, devices: &mut [JtagDevice]) -> Result<(), ProbeError> {
        let count = devices.len();
        let mut scanner = IrScanner::new(count);
        loop {
            let bit = self.jtag_next(false, true).map_err(read_failure)?;
            match scanner.step(bit)? {
                IrStep::Continue => {}
                IrStep::Resolved {
                    index,
                    ir_len,
                    ir_prescan,
                } => {
                    let device = devices.get_mut(index).ok_or(ChainError::DeviceIndexOverflow {
                        index,
                        devices: count,
                    })?;
                    device.resolve_ir(ir_len, ir_prescan);
                    log::debug!("{} at IR offset {}", device, ir_prescan);
                }
                IrStep::Done => break,
            }
        }

        if scanner.resolved() != count {
            return Err(ChainError::IrCountMismatch {
                devices: count,
                resolved: scanner.resolved(),
            }
            .into());
        }
        log::info!("Total IR length: {} bits", scanner.total_ir_len());
        Ok(())
    }
}
