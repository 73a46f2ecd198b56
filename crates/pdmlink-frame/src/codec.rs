use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::checksum::Checksum;
use crate::command::{Command, Status};
use crate::error::{FrameError, Result};
use crate::register::{RegisterSpec, RegisterValue};

/// Module address on the chain.
pub type Address = u8;

/// Address every module answers to.
pub const BROADCAST_ADDRESS: Address = 0;

/// Largest frame the one-byte length field can describe.
pub const MAX_FRAME_LEN: usize = u8::MAX as usize;

/// Request header: length (1) + address (1) + command (1).
pub const REQUEST_HEADER_SIZE: usize = 3;

/// Largest data section a request can carry.
pub const MAX_REQUEST_DATA: usize = MAX_FRAME_LEN - REQUEST_HEADER_SIZE - 1;

/// Frame layout and checksum algorithm of one protocol dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub checksum: Checksum,
    /// Responses carry the responding module's address after the length byte.
    pub response_address: bool,
}

impl FrameFormat {
    /// PDM firmware 3.x: `LEN STATUS DATA.. CHK` responses, XOR-minus-one
    /// checksum.
    pub const STANDARD: FrameFormat = FrameFormat {
        checksum: Checksum::XorDecrement,
        response_address: false,
    };

    /// Responses echo the address: `LEN ADDR STATUS DATA.. CHK`.
    pub const ADDRESS_ECHO: FrameFormat = FrameFormat {
        checksum: Checksum::XorDecrement,
        response_address: true,
    };

    /// Response header size: length, optional address, status.
    pub fn response_header_size(&self) -> usize {
        if self.response_address {
            3
        } else {
            2
        }
    }

    /// Smallest valid response (header + checksum).
    pub fn min_response_len(&self) -> usize {
        self.response_header_size() + 1
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// A command frame sent to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub address: Address,
    pub command: Command,
    pub data: Bytes,
}

impl Request {
    /// A command without data.
    pub fn command(address: Address, command: Command) -> Self {
        Self {
            address,
            command,
            data: Bytes::new(),
        }
    }

    /// Read one register.
    pub fn read(address: Address, spec: &RegisterSpec) -> Self {
        Self {
            address,
            command: Command::ReadInstruction,
            data: Bytes::copy_from_slice(&spec.code.to_be_bytes()),
        }
    }

    /// Write one register.
    ///
    /// The value must match the register's width; anything else is a caller
    /// bug, reported as [`FrameError::PayloadWidth`].
    pub fn write(address: Address, spec: &RegisterSpec, value: RegisterValue) -> Result<Self> {
        if !spec.is_writable() {
            return Err(FrameError::ReadOnly(spec.register));
        }
        if value.kind() != spec.kind {
            return Err(FrameError::PayloadWidth {
                register: spec.register,
                expected: spec.kind,
                actual: value.kind(),
            });
        }

        let mut data = BytesMut::with_capacity(2 + spec.kind.width());
        data.put_u16(spec.code);
        value.put(&mut data);
        Ok(Self {
            address,
            command: Command::WriteInstruction,
            data: data.freeze(),
        })
    }

    /// Register code carried by instruction reads and writes.
    pub fn register_code(&self) -> Option<u16> {
        match self.command {
            Command::ReadInstruction | Command::WriteInstruction if self.data.len() >= 2 => {
                Some(u16::from_be_bytes([self.data[0], self.data[1]]))
            }
            _ => None,
        }
    }

    /// Total wire size of this request.
    pub fn wire_size(&self) -> usize {
        REQUEST_HEADER_SIZE + self.data.len() + 1
    }

    /// Encode into `dst`.
    pub fn encode(&self, format: &FrameFormat, dst: &mut BytesMut) -> Result<()> {
        encode_request(format, self.address, self.command, &self.data, dst)
    }
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echoed address, when the frame format carries one.
    pub address: Option<Address>,
    pub status: Status,
    /// Data following the status byte.
    pub payload: Bytes,
}

/// Encode a request frame.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────────┬──────────┐
/// │ LEN (1B) │ ADDR(1B) │ CMD (1B) │ DATA        │ CHK (1B) │
/// │ total    │          │          │ (LEN-4 B)   │          │
/// └──────────┴──────────┴──────────┴─────────────┴──────────┘
/// ```
pub fn encode_request(
    format: &FrameFormat,
    address: Address,
    command: Command,
    data: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if data.len() > MAX_REQUEST_DATA {
        return Err(FrameError::PayloadTooLarge {
            size: data.len(),
            max: MAX_REQUEST_DATA,
        });
    }

    let start = dst.len();
    let total = REQUEST_HEADER_SIZE + data.len() + 1;
    dst.reserve(total);
    dst.put_u8(total as u8);
    dst.put_u8(address);
    dst.put_u8(command.code());
    dst.put_slice(data);
    let checksum = format.checksum.compute(&dst[start..]);
    dst.put_u8(checksum);
    Ok(())
}

/// Encode a response frame, as a module would.
pub fn encode_response(
    format: &FrameFormat,
    address: Address,
    status: Status,
    data: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let max = MAX_FRAME_LEN - format.min_response_len();
    if data.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: data.len(),
            max,
        });
    }

    let start = dst.len();
    let total = format.min_response_len() + data.len();
    dst.reserve(total);
    dst.put_u8(total as u8);
    if format.response_address {
        dst.put_u8(address);
    }
    dst.put_u8(status.code());
    dst.put_slice(data);
    let checksum = format.checksum.compute(&dst[start..]);
    dst.put_u8(checksum);
    Ok(())
}

/// Total frame length declared by the first buffered byte.
pub fn frame_len_hint(src: &[u8]) -> Option<usize> {
    src.first().map(|&len| len as usize)
}

/// Decode a response frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Otherwise the frame's bytes are consumed, whether or not it is valid.
pub fn decode_response(format: &FrameFormat, src: &mut BytesMut) -> Result<Option<Response>> {
    let Some(frame) = split_frame(format, src, format.min_response_len(), "response")? else {
        return Ok(None);
    };

    let (address, rest) = if format.response_address {
        (Some(frame[1]), &frame[2..])
    } else {
        (None, &frame[1..])
    };
    let status = Status(rest[0]);
    let payload = Bytes::copy_from_slice(&rest[1..rest.len() - 1]);

    Ok(Some(Response {
        address,
        status,
        payload,
    }))
}

/// Decode a request frame, as a module would.
pub fn decode_request(format: &FrameFormat, src: &mut BytesMut) -> Result<Option<Request>> {
    let Some(frame) = split_frame(format, src, REQUEST_HEADER_SIZE + 1, "request")? else {
        return Ok(None);
    };

    let command = Command::from_code(frame[2])
        .ok_or_else(|| FrameError::Malformed(format!("unknown command {:#04x}", frame[2])))?;

    Ok(Some(Request {
        address: frame[1],
        command,
        data: Bytes::copy_from_slice(&frame[REQUEST_HEADER_SIZE..frame.len() - 1]),
    }))
}

fn split_frame(
    format: &FrameFormat,
    src: &mut BytesMut,
    min_len: usize,
    kind: &str,
) -> Result<Option<BytesMut>> {
    let Some(total) = frame_len_hint(src) else {
        return Ok(None); // Need more data
    };

    if total < min_len {
        src.clear();
        return Err(FrameError::Malformed(format!(
            "{kind} length byte {total} below minimum {min_len}"
        )));
    }

    if src.len() < total {
        return Ok(None); // Need more data
    }

    let frame = src.split_to(total);
    let computed = format.checksum.compute(&frame[..total - 1]);
    let received = frame[total - 1];
    if computed != received {
        trace!(
            kind,
            len = total,
            computed,
            received,
            "dropping frame with bad checksum"
        );
        return Err(FrameError::Checksum { computed, received });
    }

    Ok(Some(frame))
}
