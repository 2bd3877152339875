/// Wire encoding of packets and decoding of response frames
use std::io::{self, Write};

use crate::{
    error::{DecodeError, EncodeError},
    protocol::{Packet, ProtocolVersion, Reply, ResponseFrame, ResultCode, data_len},
};

const RESPONSE_START: u8 = b'&';
const REQUEST_START: u8 = b'!';
const FRAME_END: u8 = b'#';

/// Requests carry uppercase hex; responses are accepted in either case.
fn encode_hex(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(hex::encode_upper(bytes).as_bytes());
}

fn bit_digit(bit: bool) -> u8 {
    if bit { b'1' } else { b'0' }
}

fn parse_bit(digit: u8) -> Option<bool> {
    match digit {
        b'0' => Some(false),
        b'1' => Some(true),
        _ => None,
    }
}

/// Commands that only report success answer with a single status digit, `0` for success.
fn parse_status(body: &str) -> Result<bool, DecodeError> {
    match body.as_bytes() {
        [status] => Ok(*status == b'0'),
        [] => Err(DecodeError::InvalidBody("missing status".to_string())),
        _ => Err(DecodeError::InvalidBody(format!(
            "'{}' is not a status digit",
            body
        ))),
    }
}

impl ResponseFrame {
    /// Strips the `&` / `#` delimiters and splits off the result code.
    pub fn parse(frame: &[u8]) -> Result<ResponseFrame, DecodeError> {
        let payload = frame
            .strip_prefix(&[RESPONSE_START])
            .and_then(|rest| rest.strip_suffix(&[FRAME_END]))
            .ok_or_else(|| DecodeError::Malformed(String::from_utf8_lossy(frame).into_owned()))?;
        let payload = std::str::from_utf8(payload)?;

        let mut chars = payload.chars();
        let code = chars.next().ok_or(DecodeError::MissingResultCode)?;
        let code = u8::try_from(code)
            .ok()
            .and_then(ResultCode::from_byte)
            .ok_or(DecodeError::UnknownResultCode(code))?;
        Ok(ResponseFrame::new(code, chars.as_str()))
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&[RESPONSE_START, self.code().as_byte()])?;
        writer.write_all(self.body().as_bytes())?;
        writer.write_all(&[FRAME_END])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body().len() + 3);
        out.push(RESPONSE_START);
        out.push(self.code().as_byte());
        out.extend_from_slice(self.body().as_bytes());
        out.push(FRAME_END);
        out
    }
}

impl Packet {
    const REQ_HANDSHAKE: &[u8] = b"+#!GA#";
    const REQ_HANDSHAKE_SYNC: &[u8] = b"+#";
    const REQ_QUERY_VERSION: &[u8] = b"!HC#";
    const REQ_JTAG_INIT: &[u8] = b"!JS#";
    const REQ_JTAG_RESET: &[u8] = b"!JR#";
    const REQ_JTAG_TMS: &[u8] = b"!JT";
    const REQ_JTAG_NEXT: &[u8] = b"!JN";

    /// Renders the request into its wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        self.validate()?;
        let mut out = Vec::with_capacity(16);
        match self {
            Packet::Handshake => out.extend_from_slice(Self::REQ_HANDSHAKE),
            Packet::QueryVersion => out.extend_from_slice(Self::REQ_QUERY_VERSION),
            Packet::JtagInit => out.extend_from_slice(Self::REQ_JTAG_INIT),
            Packet::JtagReset => out.extend_from_slice(Self::REQ_JTAG_RESET),
            Packet::JtagTms { cycles, states } => {
                out.extend_from_slice(Self::REQ_JTAG_TMS);
                encode_hex(&[*cycles, *states], &mut out);
                out.push(FRAME_END);
            }
            Packet::JtagTdiTdo {
                cycles,
                final_tms,
                data,
            }
            | Packet::JtagTdi {
                cycles,
                final_tms,
                data,
            } => {
                out.extend_from_slice(&[REQUEST_START, b'J', if *final_tms { b'D' } else { b'd' }]);
                encode_hex(&[*cycles], &mut out);
                encode_hex(data, &mut out);
                out.push(FRAME_END);
            }
            Packet::JtagNext { tms, tdi } => {
                out.extend_from_slice(Self::REQ_JTAG_NEXT);
                out.push(bit_digit(*tms));
                out.push(bit_digit(*tdi));
                out.push(FRAME_END);
            }
        }
        Ok(out)
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let bytes = self
            .to_bytes()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        writer.write_all(&bytes)
    }

    /// Decodes the probe's response to this packet.
    ///
    /// The result code is checked before the body is looked at. Only the protocol version query
    /// accepts a non-ok code: `N` means the firmware predates the query and speaks [`ProtocolVersion::V0`].
    pub fn parse_response(&self, frame: &[u8]) -> Result<Reply, DecodeError> {
        let response = ResponseFrame::parse(frame)?;
        let body = response.body();
        match (self, response.code()) {
            (Packet::QueryVersion, ResultCode::NotSupported) => {
                Ok(Reply::ProtocolVersion(ProtocolVersion::V0))
            }
            (_, code) if !code.is_ok() => Err(DecodeError::NotOk(code)),
            (Packet::Handshake, _) => Ok(Reply::FirmwareVersion(body.to_owned())),
            (Packet::QueryVersion, _) => ProtocolVersion::from_digit(body)
                .map(Reply::ProtocolVersion)
                .ok_or_else(|| DecodeError::UnknownVersion(body.to_owned())),
            (Packet::JtagInit | Packet::JtagReset | Packet::JtagTms { .. }, _) => {
                parse_status(body).map(Reply::Status)
            }
            (Packet::JtagTdiTdo { cycles, .. }, _) => {
                let data = hex::decode(body).map_err(|err| {
                    DecodeError::InvalidBody(format!("'{}' is not a hex string: {}", body, err))
                })?;
                let expected = data_len(*cycles);
                if data.len() != expected {
                    return Err(DecodeError::InvalidBody(format!(
                        "expected {} bytes of TDO data, got {}",
                        expected,
                        data.len()
                    )));
                }
                Ok(Reply::Data(data.into_boxed_slice()))
            }
            (Packet::JtagTdi { .. }, _) => Ok(Reply::Status(true)),
            (Packet::JtagNext { .. }, _) => body
                .as_bytes()
                .first()
                .and_then(|digit| parse_bit(*digit))
                .map(Reply::Tdo)
                .ok_or_else(|| DecodeError::InvalidBody(format!("'{}' is not a TDO bit", body))),
        }
    }

    /// Parses a request as written by [`Packet::write_to`].
    ///
    /// [`Packet::JtagTdi`] has the same wire form as [`Packet::JtagTdiTdo`] and is always read back
    /// as the latter.
    pub fn from_request(request: &[u8]) -> Result<Packet, DecodeError> {
        let request = request
            .strip_prefix(Self::REQ_HANDSHAKE_SYNC)
            .unwrap_or(request);
        let body = request
            .strip_prefix(&[REQUEST_START])
            .and_then(|rest| rest.strip_suffix(&[FRAME_END]))
            .ok_or_else(|| DecodeError::Malformed(String::from_utf8_lossy(request).into_owned()))?;
        let invalid = || DecodeError::InvalidRequest(String::from_utf8_lossy(request).into_owned());

        match body {
            b"GA" => Ok(Packet::Handshake),
            b"HC" => Ok(Packet::QueryVersion),
            b"JS" => Ok(Packet::JtagInit),
            b"JR" => Ok(Packet::JtagReset),
            [b'J', b'T', rest @ ..] => match hex::decode(rest).map_err(|_| invalid())?[..] {
                [cycles, states] => Ok(Packet::JtagTms { cycles, states }),
                _ => Err(invalid()),
            },
            [b'J', tms @ (b'D' | b'd'), rest @ ..] => {
                let bytes = hex::decode(rest).map_err(|_| invalid())?;
                let (cycles, data) = bytes.split_first().ok_or_else(invalid)?;
                let packet = Packet::JtagTdiTdo {
                    cycles: *cycles,
                    final_tms: *tms == b'D',
                    data: data.into(),
                };
                packet.validate().map_err(|_| invalid())?;
                Ok(packet)
            }
            [b'J', b'N', tms, tdi] => Ok(Packet::JtagNext {
                tms: parse_bit(*tms).ok_or_else(invalid)?,
                tdi: parse_bit(*tdi).ok_or_else(invalid)?,
            }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::{DecodeError, EncodeError};
    use crate::protocol::{Packet, ProtocolVersion, Reply, ResponseFrame, ResultCode};

    #[test]
    fn write_fixed_requests() {
        assert_eq!(Packet::Handshake.to_bytes().unwrap(), b"+#!GA#");
        assert_eq!(Packet::QueryVersion.to_bytes().unwrap(), b"!HC#");
        assert_eq!(Packet::JtagInit.to_bytes().unwrap(), b"!JS#");
        assert_eq!(Packet::JtagReset.to_bytes().unwrap(), b"!JR#");
    }

    #[test]
    fn write_tms_sequences() {
        assert_eq!(Packet::shift_dr().to_bytes().unwrap(), b"!JT0301#");
        assert_eq!(Packet::shift_ir().to_bytes().unwrap(), b"!JT0403#");
        assert_eq!(Packet::return_idle(1).to_bytes().unwrap(), b"!JT0201#");
        let packet = Packet::JtagTms {
            cycles: 0x1A,
            states: 0xBC,
        };
        assert_eq!(packet.to_bytes().unwrap(), b"!JT1ABC#");
    }

    #[test]
    fn write_tdi_tdo() {
        let packet = Packet::tdi_tdo(32, false, [0xFF; 4]).unwrap();
        assert_eq!(packet.to_bytes().unwrap(), b"!Jd20FFFFFFFF#");

        let packet = Packet::tdi_tdo(12, true, [0xA5, 0x0C]).unwrap();
        assert_eq!(packet.to_bytes().unwrap(), b"!JD0CA50C#");

        let packet = Packet::tdi(3, false, [0x05]).unwrap();
        assert_eq!(packet.to_bytes().unwrap(), b"!Jd0305#");
    }

    #[test]
    fn write_next() {
        let mut out = Vec::new();
        Packet::JtagNext {
            tms: true,
            tdi: false,
        }
        .write_to(&mut out)
        .unwrap();
        assert_eq!(out, b"!JN10#");
    }

    #[test]
    fn reject_invalid_parameters() {
        assert_eq!(
            Packet::tdi_tdo(9, false, [0x00]),
            Err(EncodeError::DataLength {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            Packet::tdi(0, false, Vec::new()),
            Err(EncodeError::ZeroCycles)
        );

        let unchecked = Packet::JtagTdiTdo {
            cycles: 8,
            final_tms: false,
            data: Box::default(),
        };
        let mut out = Vec::new();
        assert!(unchecked.write_to(&mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn parse_response_frame() {
        let frame = ResponseFrame::parse(b"&KBlack Magic Probe v1.10#").unwrap();
        assert_eq!(frame.code(), ResultCode::Ok);
        assert_eq!(frame.body(), "Black Magic Probe v1.10");
        assert_eq!(frame.to_bytes(), b"&KBlack Magic Probe v1.10#");
    }

    #[test]
    fn malformed_frames() {
        let inputs: [&[u8]; 6] = [b"", b"&", b"#", b"KOK#", b"&K0", b"&K0#\n"];
        for input in inputs {
            match ResponseFrame::parse(input) {
                Err(err) => assert!(err.is_framing(), "{:?} gave {:?}", input, err),
                Ok(frame) => panic!("expected framing error for {:?}, got {:?}", input, frame),
            }
        }
        assert!(matches!(
            ResponseFrame::parse(b"&#"),
            Err(DecodeError::MissingResultCode)
        ));
        assert!(matches!(
            ResponseFrame::parse(b"&X0#"),
            Err(DecodeError::UnknownResultCode('X'))
        ));
        assert!(matches!(
            ResponseFrame::parse(b"&K\xFF#"),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn handshake_response() {
        match Packet::Handshake.parse_response(b"&KBlack Magic Probe v2.0.0#") {
            Ok(Reply::FirmwareVersion(version)) => assert_eq!(version, "Black Magic Probe v2.0.0"),
            other => panic!("expected firmware version, got {:?}", other),
        }
    }

    #[test]
    fn protocol_version_response() {
        let expected = [
            (&b"&K0#"[..], ProtocolVersion::V0Plus),
            (&b"&K1#"[..], ProtocolVersion::V1),
            (&b"&K2#"[..], ProtocolVersion::V2),
            (&b"&K3#"[..], ProtocolVersion::V3),
            (&b"&N#"[..], ProtocolVersion::V0),
        ];
        for (frame, version) in expected {
            assert_eq!(
                Packet::QueryVersion.parse_response(frame).unwrap(),
                Reply::ProtocolVersion(version)
            );
        }
        assert!(matches!(
            Packet::QueryVersion.parse_response(b"&K7#"),
            Err(DecodeError::UnknownVersion(v)) if v == "7"
        ));
        assert!(matches!(
            Packet::QueryVersion.parse_response(b"&E#"),
            Err(DecodeError::NotOk(ResultCode::Error))
        ));
        assert!(matches!(
            Packet::QueryVersion.parse_response(b"&P#"),
            Err(DecodeError::NotOk(ResultCode::ParameterError))
        ));
    }

    #[test]
    fn non_ok_codes_fail_every_command() {
        let packets = [
            Packet::Handshake,
            Packet::JtagInit,
            Packet::JtagReset,
            Packet::shift_dr(),
            Packet::tdi_tdo(8, false, [0xFF]).unwrap(),
            Packet::tdi(8, false, [0xFF]).unwrap(),
            Packet::JtagNext {
                tms: false,
                tdi: true,
            },
        ];
        for packet in &packets {
            for frame in [&b"&P0#"[..], b"&E0#", b"&N0#"] {
                match packet.parse_response(frame) {
                    Err(DecodeError::NotOk(code)) => assert!(!code.is_ok()),
                    other => panic!("{} accepted {:?}: {:?}", packet.name(), frame, other),
                }
            }
        }
    }

    #[test]
    fn status_responses() {
        assert_eq!(
            Packet::JtagInit.parse_response(b"&K0#").unwrap(),
            Reply::Status(true)
        );
        assert_eq!(
            Packet::JtagReset.parse_response(b"&K1#").unwrap(),
            Reply::Status(false)
        );
        assert!(matches!(
            Packet::shift_ir().parse_response(b"&K#"),
            Err(DecodeError::InvalidBody(_))
        ));
        for frame in [&b"&K0junk#"[..], b"&K00#", b"&K10#"] {
            assert!(matches!(
                Packet::JtagReset.parse_response(frame),
                Err(DecodeError::InvalidBody(_))
            ));
        }
        // The TDI-only sequence ignores whatever data comes back
        let packet = Packet::tdi(16, false, [0x12, 0x34]).unwrap();
        assert_eq!(
            packet.parse_response(b"&K1234#").unwrap(),
            Reply::Status(true)
        );
    }

    #[test]
    fn tdi_tdo_response() {
        let packet = Packet::tdi_tdo(32, false, [0xFF; 4]).unwrap();
        assert_eq!(
            packet.parse_response(b"&K12345678#").unwrap(),
            Reply::Data(Box::new([0x12, 0x34, 0x56, 0x78]))
        );
        assert_eq!(
            packet.parse_response(b"&Kdeadbeef#").unwrap(),
            Reply::Data(Box::new([0xDE, 0xAD, 0xBE, 0xEF]))
        );
        assert!(matches!(
            packet.parse_response(b"&K1234#"),
            Err(DecodeError::InvalidBody(_))
        ));
        assert!(matches!(
            packet.parse_response(b"&K12345G78#"),
            Err(DecodeError::InvalidBody(_))
        ));
    }

    #[test]
    fn next_response() {
        let packet = Packet::JtagNext {
            tms: false,
            tdi: true,
        };
        assert_eq!(packet.parse_response(b"&K1#").unwrap(), Reply::Tdo(true));
        assert_eq!(packet.parse_response(b"&K0#").unwrap(), Reply::Tdo(false));
        assert!(matches!(
            packet.parse_response(b"&K#"),
            Err(DecodeError::InvalidBody(_))
        ));
    }

    #[test]
    fn read_requests() {
        assert_eq!(Packet::from_request(b"+#!GA#").unwrap(), Packet::Handshake);
        assert_eq!(Packet::from_request(b"!HC#").unwrap(), Packet::QueryVersion);
        assert_eq!(Packet::from_request(b"!JS#").unwrap(), Packet::JtagInit);
        assert_eq!(Packet::from_request(b"!JR#").unwrap(), Packet::JtagReset);
        assert_eq!(Packet::from_request(b"!JT0403#").unwrap(), Packet::shift_ir());
        assert_eq!(
            Packet::from_request(b"!JN01#").unwrap(),
            Packet::JtagNext {
                tms: false,
                tdi: true
            }
        );
        assert_eq!(
            Packet::from_request(b"!JD0ca50c#").unwrap(),
            Packet::tdi_tdo(12, true, [0xA5, 0x0C]).unwrap()
        );
    }

    #[test]
    fn read_invalid_requests() {
        assert!(matches!(
            Packet::from_request(b"JS#"),
            Err(DecodeError::Malformed(_))
        ));
        let invalid: [&[u8]; 5] = [b"!XX#", b"!JT04#", b"!JN2#", b"!Jd10FF#", b"!Jd#"];
        for request in invalid {
            assert!(
                matches!(
                    Packet::from_request(request),
                    Err(DecodeError::InvalidRequest(_))
                ),
                "{:?}",
                String::from_utf8_lossy(request)
            );
        }
    }

    #[test]
    fn tdi_tdo_echo() {
        // A probe that loops TDI back to TDO returns the request data unchanged
        let data = [0b1010_0101, 0b0000_0110];
        let packet = Packet::tdi_tdo(11, false, data).unwrap();
        let request = packet.to_bytes().unwrap();
        let echoed = match Packet::from_request(&request).unwrap() {
            Packet::JtagTdiTdo { data, .. } => data,
            other => panic!("expected TDI/TDO sequence, got {:?}", other),
        };
        let response = ResponseFrame::ok(hex::encode(echoed)).to_bytes();
        assert_eq!(
            packet.parse_response(&response).unwrap(),
            Reply::Data(data.into())
        );
    }
}
