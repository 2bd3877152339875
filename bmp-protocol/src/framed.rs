//! [`tokio_util::codec`] integration for streams that carry several response frames.
use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::DecodeError,
    protocol::{Packet, ResponseFrame},
};

/// Frames longer than this without a terminating `#` are rejected.
pub const MAX_FRAME_LEN: usize = 1024;

/// Encodes [`Packet`]s and splits the incoming byte stream into [`ResponseFrame`]s.
///
/// Bytes preceding a frame's `&` are discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeCodec;

impl Decoder for ProbeCodec {
    type Item = ResponseFrame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ResponseFrame>, DecodeError> {
        let Some(start) = src.iter().position(|b| *b == b'&') else {
            src.clear();
            return Ok(None);
        };
        src.advance(start);

        let Some(end) = src.iter().position(|b| *b == b'#') else {
            if src.len() > MAX_FRAME_LEN {
                let discarded = src.split();
                return Err(DecodeError::Malformed(format!(
                    "no frame end within {} bytes ({} buffered)",
                    MAX_FRAME_LEN,
                    discarded.len()
                )));
            }
            return Ok(None);
        };
        let frame = src.split_to(end + 1);
        ResponseFrame::parse(&frame).map(Some)
    }
}

impl<'a> Encoder<&'a Packet> for ProbeCodec {
    type Error = io::Error;

    fn encode(&mut self, packet: &'a Packet, dst: &mut BytesMut) -> Result<(), io::Error> {
        let bytes = packet
            .to_bytes()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
