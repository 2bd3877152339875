use std::fmt::Display;

use crate::error::EncodeError;

/// Revision of the remote protocol spoken by the probe firmware.
///
/// Negotiated once per session from the answer to [`Packet::QueryVersion`].
/// Firmware that predates the version query answers with
/// [`ResultCode::NotSupported`], which maps to [`ProtocolVersion::V0`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ProtocolVersion {
    V0,
    V0Plus,
    V1,
    V2,
    V3,
}

impl ProtocolVersion {
    /// Maps the digit reported by the probe to a version.
    pub fn from_digit(digit: &str) -> Option<ProtocolVersion> {
        match digit {
            "0" => Some(ProtocolVersion::V0Plus),
            "1" => Some(ProtocolVersion::V1),
            "2" => Some(ProtocolVersion::V2),
            "3" => Some(ProtocolVersion::V3),
            _ => None,
        }
    }
}

#[test]
fn version_ordering() {
    assert!(ProtocolVersion::V0 < ProtocolVersion::V0Plus);
    assert!(ProtocolVersion::V3 > ProtocolVersion::V1);
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProtocolVersion::V0 => "v0",
            ProtocolVersion::V0Plus => "v0+",
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
            ProtocolVersion::V3 => "v3",
        };
        f.write_str(name)
    }
}

/// The first payload byte of every response.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResultCode {
    /// `K`
    Ok,
    /// `P`
    ParameterError,
    /// `E`
    Error,
    /// `N`
    NotSupported,
}

impl ResultCode {
    pub fn from_byte(byte: u8) -> Option<ResultCode> {
        match byte {
            b'K' => Some(ResultCode::Ok),
            b'P' => Some(ResultCode::ParameterError),
            b'E' => Some(ResultCode::Error),
            b'N' => Some(ResultCode::NotSupported),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            ResultCode::Ok => b'K',
            ResultCode::ParameterError => b'P',
            ResultCode::Error => b'E',
            ResultCode::NotSupported => b'N',
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultCode::Ok => "ok",
            ResultCode::ParameterError => "parameter error",
            ResultCode::Error => "error",
            ResultCode::NotSupported => "not supported",
        };
        f.write_str(name)
    }
}

/// A request sent from the host to the probe.
///
/// Every packet has exactly one response frame. The probe processes requests strictly in order
/// and never sends unsolicited data, so the host must wait for the response to one packet before
/// sending the next.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet {
    /// Synchronises with the probe and requests its firmware version.
    Handshake,
    /// Requests the remote protocol version.
    QueryVersion,
    /// Switches the probe's debug interface to JTAG.
    JtagInit,
    /// Drives all TAPs into Test-Logic-Reset.
    JtagReset,
    /// Clocks `cycles` TMS states out of `states`, LSB first. TDI is held constant.
    JtagTms { cycles: u8, states: u8 },
    /// Shifts `cycles` bits of `data` into TDI, LSB first, and returns the bits sampled on TDO.
    /// TMS is raised on the last cycle if `final_tms` is set.
    JtagTdiTdo {
        cycles: u8,
        final_tms: bool,
        /// ⌈cycles / 8⌉ bytes of TDI data
        data: Box<[u8]>,
    },
    /// Same wire format as [`Packet::JtagTdiTdo`], but the sampled TDO bits are ignored.
    JtagTdi {
        cycles: u8,
        final_tms: bool,
        /// ⌈cycles / 8⌉ bytes of TDI data
        data: Box<[u8]>,
    },
    /// Performs a single TCK cycle with the given TMS and TDI levels and samples TDO.
    JtagNext { tms: bool, tdi: bool },
}

impl Packet {
    /// Moves the TAPs from Test-Logic-Reset or Run-Test/Idle to Shift-DR.
    pub fn shift_dr() -> Packet {
        Packet::JtagTms {
            cycles: 3,
            states: 0x01,
        }
    }

    /// Moves the TAPs from Run-Test/Idle to Shift-IR.
    pub fn shift_ir() -> Packet {
        Packet::JtagTms {
            cycles: 4,
            states: 0x03,
        }
    }

    /// Returns the TAPs to Run-Test/Idle from an Exit1 state.
    pub fn return_idle(cycles: u8) -> Packet {
        Packet::JtagTms {
            cycles: cycles.saturating_add(1),
            states: 0x01,
        }
    }

    /// Creates a checked [`Packet::JtagTdiTdo`].
    pub fn tdi_tdo(
        cycles: u8,
        final_tms: bool,
        data: impl Into<Box<[u8]>>,
    ) -> Result<Packet, EncodeError> {
        let packet = Packet::JtagTdiTdo {
            cycles,
            final_tms,
            data: data.into(),
        };
        packet.validate()?;
        Ok(packet)
    }

    /// Creates a checked [`Packet::JtagTdi`].
    pub fn tdi(
        cycles: u8,
        final_tms: bool,
        data: impl Into<Box<[u8]>>,
    ) -> Result<Packet, EncodeError> {
        let packet = Packet::JtagTdi {
            cycles,
            final_tms,
            data: data.into(),
        };
        packet.validate()?;
        Ok(packet)
    }

    /// Short human readable name, used in log and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Handshake => "handshake",
            Packet::QueryVersion => "protocol version",
            Packet::JtagInit => "JTAG init",
            Packet::JtagReset => "JTAG reset",
            Packet::JtagTms { .. } => "JTAG TMS sequence",
            Packet::JtagTdiTdo { .. } => "JTAG TDI/TDO sequence",
            Packet::JtagTdi { .. } => "JTAG TDI sequence",
            Packet::JtagNext { .. } => "JTAG next",
        }
    }

    /// Checks that the packet parameters can be rendered on the wire.
    pub fn validate(&self) -> Result<(), EncodeError> {
        match self {
            Packet::JtagTms { cycles: 0, .. } => Err(EncodeError::ZeroCycles),
            Packet::JtagTdiTdo { cycles, data, .. } | Packet::JtagTdi { cycles, data, .. } => {
                if *cycles == 0 {
                    return Err(EncodeError::ZeroCycles);
                }
                let expected = data_len(*cycles);
                if data.len() != expected {
                    return Err(EncodeError::DataLength {
                        expected,
                        got: data.len(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Number of data bytes needed to carry `cycles` bits.
pub fn data_len(cycles: u8) -> usize {
    (cycles as usize).div_ceil(8)
}

/// The typed result of a successfully decoded response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    /// Answer to [`Packet::Handshake`]
    FirmwareVersion(String),
    /// Answer to [`Packet::QueryVersion`]
    ProtocolVersion(ProtocolVersion),
    /// Answer to commands that only report success or failure.
    /// `true` means the probe reported success.
    Status(bool),
    /// TDO bits captured by [`Packet::JtagTdiTdo`], LSB first.
    Data(Box<[u8]>),
    /// The TDO level sampled by [`Packet::JtagNext`]
    Tdo(bool),
}

/// A response frame with its framing removed: `&<code><body>#`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseFrame {
    code: ResultCode,
    body: String,
}

impl ResponseFrame {
    pub fn new(code: ResultCode, body: impl Into<String>) -> ResponseFrame {
        ResponseFrame {
            code,
            body: body.into(),
        }
    }

    /// A frame with result code `K`.
    pub fn ok(body: impl Into<String>) -> ResponseFrame {
        ResponseFrame::new(ResultCode::Ok, body)
    }

    pub fn code(&self) -> ResultCode {
        self.code
    }

    /// Everything after the result code
    pub fn body(&self) -> &str {
        &self.body
    }
}
