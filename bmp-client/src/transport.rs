//! # Byte Channel to the Probe
//!
//! The probe exposes its remote protocol on a serial endpoint (usually the GDB port of the
//! probe's USB CDC-ACM interface). [`SerialTransport`] opens that endpoint in raw mode with a
//! bounded read timeout so a read never blocks indefinitely.
//!
//! Any other byte channel (e.g. an in-memory simulator) can be used by implementing [`Transport`].
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::unix::fs::OpenOptionsExt,
    path::Path,
    time::Duration,
};

use nix::{
    fcntl::OFlag,
    sys::termios::{
        self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    },
};

use crate::{Probe, error::ProbeError};

/// A half-duplex byte channel to the probe.
pub trait Transport {
    /// Writes `data` with a single write call and returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Performs one read that returns within the transport's timeout.
    /// Returns `Ok(0)` if the timeout expired without any data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the channel. Calling it more than once has no effect.
    fn close(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound for a single read. Rounded to deciseconds, between 0.1 s and 25.5 s.
    pub read_timeout: Duration,
    /// Size of the buffer a response is read into
    pub read_buffer_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(500),
            read_buffer_len: 1024,
        }
    }
}

/// Builder to open a [Probe] on a serial endpoint with modified configuration options
///
/// # Example
///
/// ```ignore
/// use bmp_client::transport::Builder;
/// use std::time::Duration;
///
/// let probe = Builder::new()
///     .read_timeout(Duration::from_secs(1))
///     .open("/dev/ttyACM0")?;
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set how long a single read may wait for data
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the largest response that can be received in one read
    pub fn read_buffer_len(mut self, len: usize) -> Self {
        self.config.read_buffer_len = len;
        self
    }

    /// Open the endpoint and return the probe
    pub fn open(self, endpoint: impl AsRef<Path>) -> Result<Probe<SerialTransport>, ProbeError> {
        Probe::open(endpoint, self.config)
    }
}

/// Converts a timeout into the termios `VTIME` unit.
fn deciseconds(timeout: Duration) -> u8 {
    (timeout.as_millis() / 100).clamp(1, u8::MAX as u128) as u8
}

/// Puts the terminal into raw 8N1 mode without flow control.
/// `VMIN = 0` together with `VTIME` makes every read return after at most `read_timeout`.
fn configure_raw(file: &File, read_timeout: Duration) -> nix::Result<()> {
    let mut attrs = termios::tcgetattr(file)?;

    attrs.control_flags &= !(ControlFlags::CSIZE | ControlFlags::CSTOPB | ControlFlags::PARENB);
    attrs.control_flags |= ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD;
    attrs.input_flags &= !(InputFlags::IGNBRK
        | InputFlags::IXON
        | InputFlags::IXOFF
        | InputFlags::IXANY
        | InputFlags::ICRNL
        | InputFlags::INLCR
        | InputFlags::ISTRIP);
    attrs.output_flags = OutputFlags::empty();
    attrs.local_flags = LocalFlags::empty();

    attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = deciseconds(read_timeout);

    termios::tcsetattr(file, SetArg::TCSANOW, &attrs)
}

/// A serial endpoint opened in raw mode.
#[derive(Debug)]
pub struct SerialTransport {
    file: Option<File>,
}

impl SerialTransport {
    pub fn open(endpoint: impl AsRef<Path>, config: &Config) -> Result<SerialTransport, ProbeError> {
        let path = endpoint.as_ref();
        let open_error = |source: io::Error| ProbeError::Open {
            endpoint: path.to_path_buf(),
            source,
        };

        log::debug!("Opening serial endpoint: {}", path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(path)
            .map_err(open_error)?;

        configure_raw(&file, config.read_timeout).map_err(|errno| open_error(errno.into()))?;
        log::debug!(
            "Endpoint configured: read_timeout={:?}",
            config.read_timeout
        );

        Ok(SerialTransport { file: Some(file) })
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "Endpoint is closed"))
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Write::write(self.file()?, data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self.file()?, buf)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            log::debug!("Serial endpoint closed");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timeout_in_deciseconds() {
        assert_eq!(deciseconds(Duration::from_millis(500)), 5);
        assert_eq!(deciseconds(Duration::from_millis(10)), 1);
        assert_eq!(deciseconds(Duration::from_secs(60)), 255);
    }

    #[test]
    fn open_missing_endpoint() {
        match SerialTransport::open("/nonexistent/ttyBmp0", &Config::default()) {
            Err(ProbeError::Open { endpoint, source }) => {
                assert_eq!(endpoint, Path::new("/nonexistent/ttyBmp0"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected open error, got {:?}", other),
        }
    }

    #[test]
    fn regular_file_is_not_a_terminal() {
        let path = std::env::temp_dir().join(format!("bmp-client-{}", std::process::id()));
        File::create(&path).unwrap();
        let result = SerialTransport::open(&path, &Config::default());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(ProbeError::Open { .. })));
    }

    #[test]
    fn closed_transport() {
        let mut transport = SerialTransport { file: None };
        transport.close();
        assert!(!transport.is_open());
        assert_eq!(
            transport.write(b"!JS#").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }
}
