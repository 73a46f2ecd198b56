//! Command identifiers and response status codes.

use std::fmt;

/// Commands understood by PDM firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Query the module address. Sent to the broadcast address.
    ReadAddress = 0x01,
    /// Query the protocol version (identify).
    ReadProtocolVersion = 0x02,
    /// Query the last error code.
    ReadErrorCode = 0x03,
    /// Write one instruction (register) in volatile memory.
    WriteInstruction = 0x10,
    /// Read one instruction (register).
    ReadInstruction = 0x11,
    /// Make every written instruction effective.
    ApplyAllInstructions = 0x12,
    /// Persist instructions to non-volatile memory.
    SaveAllInstructions = 0x13,
    /// Read a measurement.
    ReadMeasure = 0x14,
    /// Read the pulsed/continuous state.
    ReadCwPulse = 0x20,
}

impl Command {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a command by wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Command::ReadAddress),
            0x02 => Some(Command::ReadProtocolVersion),
            0x03 => Some(Command::ReadErrorCode),
            0x10 => Some(Command::WriteInstruction),
            0x11 => Some(Command::ReadInstruction),
            0x12 => Some(Command::ApplyAllInstructions),
            0x13 => Some(Command::SaveAllInstructions),
            0x14 => Some(Command::ReadMeasure),
            0x20 => Some(Command::ReadCwPulse),
            _ => None,
        }
    }

    /// Returns a human-readable name for the command.
    pub fn name(self) -> &'static str {
        match self {
            Command::ReadAddress => "READ_ADDRESS",
            Command::ReadProtocolVersion => "READ_PROTOCOL_VERSION",
            Command::ReadErrorCode => "READ_ERROR_CODE",
            Command::WriteInstruction => "WRITE_INSTRUCTION",
            Command::ReadInstruction => "READ_INSTRUCTION",
            Command::ApplyAllInstructions => "APPLY_ALL_INSTRUCTIONS",
            Command::SaveAllInstructions => "SAVE_ALL_INSTRUCTIONS",
            Command::ReadMeasure => "READ_MEASURE",
            Command::ReadCwPulse => "READ_CW_PULSE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response status byte.
///
/// Fault codes are single bits; unknown codes are kept as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u8);

impl Status {
    pub const OK: Status = Status(0x00);
    /// The module timed out receiving the request.
    pub const TIMEOUT: Status = Status(0x01);
    pub const UNKNOWN_COMMAND: Status = Status(0x02);
    pub const QUERY_ERROR: Status = Status(0x04);
    pub const BAD_LENGTH: Status = Status(0x08);
    /// The module saw a corrupted request.
    pub const CHECKSUM_ERROR: Status = Status(0x10);

    const NAMED: [(Status, &'static str); 5] = [
        (Status::TIMEOUT, "TIMEOUT"),
        (Status::UNKNOWN_COMMAND, "UNKNOWN_COMMAND"),
        (Status::QUERY_ERROR, "QUERY_ERROR"),
        (Status::BAD_LENGTH, "BAD_LENGTH"),
        (Status::CHECKSUM_ERROR, "CHECKSUM_ERROR"),
    ];

    /// Raw status code.
    pub fn code(self) -> u8 {
        self.0
    }

    /// True for the success status.
    pub fn is_ok(self) -> bool {
        self == Status::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("OK");
        }

        let names: Vec<&str> = Status::NAMED
            .iter()
            .filter(|(flag, _)| self.0 & flag.0 != 0)
            .map(|(_, name)| *name)
            .collect();
        let known = Status::NAMED.iter().fold(0u8, |acc, (flag, _)| acc | flag.0);

        if names.is_empty() || self.0 & !known != 0 {
            write!(f, "{:#04x}", self.0)?;
            if !names.is_empty() {
                write!(f, " ({})", names.join("|"))?;
            }
            Ok(())
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
