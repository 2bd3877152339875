use std::{error::Error, fmt::Display, io, path::PathBuf};

use bmp_protocol::{
    Reply,
    error::{DecodeError, EncodeError},
};

/// Phases of the scan-chain discovery that abort the whole scan when they fail.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanPhase {
    Initialize,
    Reset,
    EnterShiftDr,
    EnterShiftIr,
}

impl Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Initialize => write!(f, "failed to initialize JTAG"),
            ScanPhase::Reset => write!(f, "failed to reset JTAG TAPs"),
            ScanPhase::EnterShiftDr => write!(f, "failed to change state to Shift-DR"),
            ScanPhase::EnterShiftIr => write!(f, "failed to change state to Shift-IR"),
        }
    }
}

/// Conditions that make the discovered chain topology untrustworthy.
#[derive(Debug)]
pub enum ChainError {
    /// An exchange failed while shifting IDCODEs or IR bits out of the chain.
    ReadFailure(Box<ProbeError>),
    /// The IDCODE scan never saw the chain end, e.g. because TDO is stuck low.
    IdcodeScanUnterminated { devices: usize },
    /// The IR scan found more devices than the IDCODE scan.
    DeviceIndexOverflow { index: usize, devices: usize },
    /// The IR scan ended before every device found by the IDCODE scan was resolved.
    IrCountMismatch { devices: usize, resolved: usize },
    /// The IR bit stream did not terminate within the given number of bits.
    IrScanUnterminated { bits: usize },
}

impl Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::ReadFailure(err) => write!(f, "Failure reading scan chain: {}", err),
            ChainError::IdcodeScanUnterminated { devices } => write!(
                f,
                "No chain end after {} IDCODEs, is TDO stuck?",
                devices
            ),
            ChainError::DeviceIndexOverflow { index, devices } => write!(
                f,
                "Device index overflow, non-compliant IR? (device {} of {})",
                index, devices
            ),
            ChainError::IrCountMismatch { devices, resolved } => write!(
                f,
                "IR scan resolved {} of {} devices",
                resolved, devices
            ),
            ChainError::IrScanUnterminated { bits } => {
                write!(f, "IR scan did not terminate within {} bits", bits)
            }
        }
    }
}

impl Error for ChainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChainError::ReadFailure(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Errors reported by a [`crate::Probe`].
#[derive(Debug)]
pub enum ProbeError {
    /// The endpoint could not be opened or configured.
    Open { endpoint: PathBuf, source: io::Error },
    IoError(io::Error),
    /// The transport accepted fewer bytes than the request holds.
    ShortWrite { written: usize, expected: usize },
    /// The read timed out without any data.
    NoResponse,
    Decode(DecodeError),
    Encode(EncodeError),
    /// The probe answered but reported that the command failed.
    Rejected(&'static str),
    /// The probe answered with a reply of the wrong kind for the command.
    UnexpectedReply { command: &'static str, reply: Reply },
    /// A JTAG operation was attempted before JTAG was initialized.
    NotInitialized,
    Chain(ChainError),
    /// A mandatory phase of the scan-chain discovery failed.
    Scan {
        phase: ScanPhase,
        source: Box<ProbeError>,
    },
}

impl From<io::Error> for ProbeError {
    fn from(value: io::Error) -> Self {
        ProbeError::IoError(value)
    }
}

impl From<DecodeError> for ProbeError {
    fn from(value: DecodeError) -> Self {
        ProbeError::Decode(value)
    }
}

impl From<EncodeError> for ProbeError {
    fn from(value: EncodeError) -> Self {
        ProbeError::Encode(value)
    }
}

impl From<ChainError> for ProbeError {
    fn from(value: ChainError) -> Self {
        ProbeError::Chain(value)
    }
}

impl Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Open { endpoint, source } => {
                write!(f, "Unable to open endpoint {}: {}", endpoint.display(), source)
            }
            ProbeError::IoError(error) => write!(f, "{}", error),
            ProbeError::ShortWrite { written, expected } => write!(
                f,
                "Short write: sent {} of {} bytes",
                written, expected
            ),
            ProbeError::NoResponse => write!(f, "No response from probe"),
            ProbeError::Decode(error) => write!(f, "{}", error),
            ProbeError::Encode(error) => write!(f, "{}", error),
            ProbeError::Rejected(command) => write!(f, "Probe rejected {} request", command),
            ProbeError::UnexpectedReply { command, reply } => {
                write!(f, "Unexpected reply to {} request: {:?}", command, reply)
            }
            ProbeError::NotInitialized => write!(f, "JTAG is not initialized"),
            ProbeError::Chain(error) => write!(f, "{}", error),
            ProbeError::Scan { phase, source } => write!(f, "Scan aborted, {}: {}", phase, source),
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeError::Open { source, .. } => Some(source),
            ProbeError::IoError(error) => Some(error),
            ProbeError::Decode(error) => Some(error),
            ProbeError::Encode(error) => Some(error),
            ProbeError::Chain(error) => Some(error),
            ProbeError::Scan { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl ProbeError {
    /// Whether the error came from the byte channel rather than from the probe's answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProbeError::Open { .. }
                | ProbeError::IoError(_)
                | ProbeError::ShortWrite { .. }
                | ProbeError::NoResponse
        )
    }
}
