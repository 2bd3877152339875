//! # Black Magic Probe Remote Protocol
//!
//! This crate implements the host side of the Black Magic Probe *remote protocol*,
//! the ASCII request/response protocol a host uses to drive the probe's JTAG engine directly.
//!
//! ## Overview
//!
//! Every interaction is one request followed by exactly one response frame.
//! This library turns typed requests into wire bytes and response frames back into typed results:
//!
//! - Render [`Packet`]s into their request strings
//! - Validate and unwrap response frames ([`ResponseFrame`])
//! - Interpret each response according to the command that caused it ([`Reply`])
//! - Parse request strings back into [`Packet`]s, for probe simulators
//!
//! ## Basic Usage
//!
//! ### Encoding a Request
//!
//! ```
//! use bmp_protocol::Packet;
//!
//! // Shift 32 bits of ones through the chain, staying in Shift-DR
//! let packet = Packet::tdi_tdo(32, false, [0xFF; 4]).expect("Four bytes carry 32 bits");
//! let mut buffer = Vec::new();
//! packet.write_to(&mut buffer).expect("Writing to vector shouldn't fail");
//! assert_eq!(buffer, b"!Jd20FFFFFFFF#");
//! ```
//!
//! ### Decoding a Response
//!
//! ```
//! use bmp_protocol::{Packet, ProtocolVersion, Reply};
//!
//! let reply = Packet::QueryVersion.parse_response(b"&K3#").expect("Response should parse");
//! assert_eq!(reply, Reply::ProtocolVersion(ProtocolVersion::V3));
//!
//! // Old firmware does not know the query at all
//! let reply = Packet::QueryVersion.parse_response(b"&N#").expect("Response should parse");
//! assert_eq!(reply, Reply::ProtocolVersion(ProtocolVersion::V0));
//! ```
//!
//! ## Message Format
//!
//! Requests are not wrapped; numbers are rendered as fixed width uppercase hex:
//!
//! - **Handshake**: `+#!GA#`
//! - **Protocol version**: `!HC#`
//! - **JTAG init / reset**: `!JS#` / `!JR#`
//! - **TMS sequence**: `!JT<cycles: 2 hex><states: 2 hex>#`
//! - **TDI/TDO sequence**: `!J<D|d><cycles: 2 hex><data: hex>#`, `D` raises TMS on the last cycle
//! - **Next**: `!JN<tms: 0|1><tdi: 0|1>#`
//!
//! Responses are framed as `&<code><body>#` where `code` is one of
//! `K` (ok), `P` (parameter error), `E` (error) or `N` (not supported).
//!
//! ## Error Handling
//!
//! Decoding never panics. Bad framing, non-ok result codes and unexpected bodies are reported as
//! [`error::DecodeError`]; packets with inconsistent parameters are rejected with
//! [`error::EncodeError`].
//!
//! ## Features
//!
//! - `tokio`: adds [`framed::ProbeCodec`], a [`tokio_util::codec`] implementation
//!   for byte streams that carry several frames.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
#[cfg(feature = "tokio")]
pub mod framed;
