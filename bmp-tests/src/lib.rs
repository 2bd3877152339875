//! A simulated Black Magic Probe with a JTAG chain behind it.
//!
//! [`SimulatedProbe`] parses every request with the protocol crate and answers the way a probe
//! with the configured TAPs would, so the client can be exercised end to end without hardware.
use std::{collections::VecDeque, io};

use bmp_client::transport::Transport;
use bmp_protocol::{Packet, ResponseFrame, ResultCode, data_len};

/// A TAP on the simulated chain.
#[derive(Clone, Debug)]
pub struct SimulatedTap {
    pub idcode: u32,
    pub ir_len: usize,
}

impl SimulatedTap {
    pub fn new(idcode: u32, ir_len: usize) -> SimulatedTap {
        SimulatedTap { idcode, ir_len }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TapState {
    Reset,
    Idle,
    ShiftDr,
    ShiftIr,
}

pub struct SimulatedProbe {
    firmware: String,
    protocol_version: Option<u8>,
    taps: Vec<SimulatedTap>,
    jtag: bool,
    state: TapState,
    dr: VecDeque<u32>,
    ir: VecDeque<bool>,
    pending: Option<Vec<u8>>,
    requests: Vec<Packet>,
    answer_limit: Option<usize>,
    write_limit: Option<usize>,
}

impl SimulatedProbe {
    /// Creates a probe whose chain holds `taps`, the first one closest to TDO.
    pub fn new(taps: Vec<SimulatedTap>) -> SimulatedProbe {
        SimulatedProbe {
            firmware: "Black Magic Probe v2.0.0".to_string(),
            protocol_version: Some(3),
            taps,
            jtag: false,
            state: TapState::Reset,
            dr: VecDeque::new(),
            ir: VecDeque::new(),
            pending: None,
            requests: Vec::new(),
            answer_limit: None,
            write_limit: None,
        }
    }

    pub fn with_firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = firmware.into();
        self
    }

    /// `None` simulates firmware that does not know the version query.
    pub fn with_protocol_version(mut self, version: Option<u8>) -> Self {
        self.protocol_version = version;
        self
    }

    /// Stops answering after `count` requests, as if the probe was unplugged.
    pub fn answer_limit(mut self, count: usize) -> Self {
        self.answer_limit = Some(count);
        self
    }

    /// Accepts at most `bytes` bytes per write.
    pub fn write_limit(mut self, bytes: usize) -> Self {
        self.write_limit = Some(bytes);
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> &[Packet] {
        &self.requests
    }

    /// Shift-DR after reset: every TAP presents its IDCODE, then the ones fed in at TDI come out.
    fn enter_shift_dr(&mut self) {
        self.state = TapState::ShiftDr;
        self.dr = self.taps.iter().map(|tap| tap.idcode).collect();
    }

    /// Shift-IR: every IR captures `0..01`, shifted out LSB first.
    fn enter_shift_ir(&mut self) {
        self.state = TapState::ShiftIr;
        self.ir = self
            .taps
            .iter()
            .flat_map(|tap| (0..tap.ir_len).map(|bit| bit == 0))
            .collect();
    }

    fn respond(&mut self, packet: &Packet) -> ResponseFrame {
        match packet {
            Packet::Handshake => ResponseFrame::ok(self.firmware.clone()),
            Packet::QueryVersion => match self.protocol_version {
                Some(version) => ResponseFrame::ok(version.to_string()),
                None => ResponseFrame::new(ResultCode::NotSupported, ""),
            },
            Packet::JtagInit => {
                self.jtag = true;
                self.state = TapState::Reset;
                ResponseFrame::ok("0")
            }
            _ if !self.jtag => ResponseFrame::new(ResultCode::Error, ""),
            Packet::JtagReset => {
                self.state = TapState::Reset;
                ResponseFrame::ok("0")
            }
            Packet::JtagTms {
                cycles: 3,
                states: 0x01,
            } if matches!(self.state, TapState::Reset | TapState::Idle) => {
                self.enter_shift_dr();
                ResponseFrame::ok("0")
            }
            Packet::JtagTms {
                cycles: 4,
                states: 0x03,
            } => {
                self.enter_shift_ir();
                ResponseFrame::ok("0")
            }
            Packet::JtagTms { .. } => {
                self.state = TapState::Idle;
                ResponseFrame::ok("0")
            }
            Packet::JtagTdiTdo { cycles, .. } | Packet::JtagTdi { cycles, .. } => {
                let tdo = if self.state == TapState::ShiftDr && *cycles == 32 {
                    self.dr.pop_front().unwrap_or(u32::MAX).to_be_bytes().to_vec()
                } else {
                    vec![0xFF; data_len(*cycles)]
                };
                ResponseFrame::ok(hex::encode_upper(tdo))
            }
            Packet::JtagNext { tms, .. } => {
                let tdo = if self.state == TapState::ShiftIr && !tms {
                    self.ir.pop_front().unwrap_or(true)
                } else {
                    true
                };
                if *tms {
                    self.state = TapState::Idle;
                }
                ResponseFrame::ok(if tdo { "1" } else { "0" })
            }
        }
    }
}

impl Transport for SimulatedProbe {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(limit) = self.write_limit {
            if data.len() > limit {
                return Ok(limit);
            }
        }

        let packet = Packet::from_request(data)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let answer = self
            .answer_limit
            .is_none_or(|limit| self.requests.len() < limit);
        if answer {
            self.pending = Some(self.respond(&packet).to_bytes());
        }
        self.requests.push(packet);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.pending.take() {
            Some(response) => {
                let len = response.len().min(buf.len());
                buf[..len].copy_from_slice(&response[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }
}
