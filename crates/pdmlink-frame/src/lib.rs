//! Frame codec for the PDM laser-diode serial protocol.
//!
//! A request frame is `LEN ADDR CMD DATA.. CHK`; a response frame is
//! `LEN STATUS DATA.. CHK` (or `LEN ADDR STATUS DATA.. CHK` with
//! [`FrameFormat::ADDRESS_ECHO`]). `LEN` counts the whole frame, so one byte
//! caps a frame at 255 bytes. `CHK` covers every preceding byte.
//!
//! This crate also carries the versioned register table, so callers never
//! hardcode register codes or widths.

pub mod checksum;
pub mod codec;
pub mod command;
pub mod error;
pub mod register;
pub mod version;

pub use checksum::Checksum;
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, frame_len_hint, Address,
    FrameFormat, Request, Response, BROADCAST_ADDRESS, MAX_FRAME_LEN, MAX_REQUEST_DATA,
    REQUEST_HEADER_SIZE,
};
pub use command::{Command, Status};
pub use error::{FrameError, Result};
pub use register::{Access, Register, RegisterSpec, RegisterValue, ValueKind, REGISTERS};
pub use version::{ProtocolVersion, VersionRange};
