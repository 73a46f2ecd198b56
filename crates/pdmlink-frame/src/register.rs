//! Register table.
//!
//! Each row describes one register for a range of protocol versions: its wire
//! code, value width and access mode. Supporting a new protocol revision means
//! adding rows here; nothing above this table hardcodes codes or widths.

use std::fmt;
use std::str::FromStr;

use bytes::BufMut;

use crate::error::{FrameError, Result};
use crate::version::ProtocolVersion;

/// A named register ("instruction" in PDM firmware terms).
///
/// Declaration order is the order in which pending writes are pushed:
/// configuration first, then current source, timing, currents, and laser
/// activation last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    SyncSource,
    DelayLineType,
    ControlModeSelection,
    SoftwareControlMode,
    CurrentSource,
    PulseWidth,
    Delay,
    OffsetCurrent,
    Current,
    LaserActivation,
    Frequency,
    Temperature,
    MaximumCurrent,
    InterlockStatus,
}

impl Register {
    /// Every register, in write order.
    pub const ALL: [Register; 14] = [
        Register::SyncSource,
        Register::DelayLineType,
        Register::ControlModeSelection,
        Register::SoftwareControlMode,
        Register::CurrentSource,
        Register::PulseWidth,
        Register::Delay,
        Register::OffsetCurrent,
        Register::Current,
        Register::LaserActivation,
        Register::Frequency,
        Register::Temperature,
        Register::MaximumCurrent,
        Register::InterlockStatus,
    ];

    /// Snake-case name used in logs and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Register::SyncSource => "sync_source",
            Register::DelayLineType => "delay_line_type",
            Register::ControlModeSelection => "control_mode_selection",
            Register::SoftwareControlMode => "software_control_mode",
            Register::CurrentSource => "current_source",
            Register::PulseWidth => "pulse_width",
            Register::Delay => "delay",
            Register::OffsetCurrent => "offset_current",
            Register::Current => "current",
            Register::LaserActivation => "laser_activation",
            Register::Frequency => "frequency",
            Register::Temperature => "temperature",
            Register::MaximumCurrent => "maximum_current",
            Register::InterlockStatus => "interlock_status",
        }
    }

    /// Table row for this register at `version`, if the register exists there.
    pub fn spec(self, version: ProtocolVersion) -> Option<&'static RegisterSpec> {
        REGISTERS
            .iter()
            .find(|spec| spec.register == self && spec.available_in(version))
    }

    /// Earliest version that defines this register.
    pub fn introduced_in(self) -> Option<ProtocolVersion> {
        REGISTERS
            .iter()
            .filter(|spec| spec.register == self)
            .map(|spec| spec.since)
            .min()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Register::ALL
            .iter()
            .copied()
            .find(|register| register.name() == s)
            .ok_or_else(|| FrameError::Malformed(format!("unknown register '{s}'")))
    }
}

/// Encoding of a register value on the wire (big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    U8,
    U32,
    F32,
}

impl ValueKind {
    /// Width in bytes.
    pub fn width(self) -> usize {
        match self {
            ValueKind::U8 => 1,
            ValueKind::U32 | ValueKind::F32 => 4,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::U8 => "u8",
            ValueKind::U32 => "u32",
            ValueKind::F32 => "f32",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// One row of the register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub register: Register,
    /// Instruction code, sent as a big-endian u16.
    pub code: u16,
    pub kind: ValueKind,
    pub access: Access,
    /// First protocol version defining this row.
    pub since: ProtocolVersion,
    /// First protocol version no longer using this row.
    pub until: Option<ProtocolVersion>,
}

impl RegisterSpec {
    /// A row available from protocol 3.4 on.
    pub const fn new(register: Register, code: u16, kind: ValueKind, access: Access) -> Self {
        Self {
            register,
            code,
            kind,
            access,
            since: ProtocolVersion::V3_4,
            until: None,
        }
    }

    pub const fn since(mut self, version: ProtocolVersion) -> Self {
        self.since = version;
        self
    }

    /// Retire this row from `version` on, e.g. when a later revision moves
    /// the register to a new code or width.
    pub const fn until(mut self, version: ProtocolVersion) -> Self {
        self.until = Some(version);
        self
    }

    pub fn available_in(&self, version: ProtocolVersion) -> bool {
        self.since <= version && self.until.map_or(true, |until| version < until)
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

use Access::{ReadOnly, ReadWrite};

/// The register table.
pub static REGISTERS: &[RegisterSpec] = &[
    RegisterSpec::new(Register::SyncSource, 10, ValueKind::U8, ReadWrite),
    RegisterSpec::new(Register::DelayLineType, 11, ValueKind::U8, ReadWrite),
    RegisterSpec::new(Register::Frequency, 12, ValueKind::U32, ReadOnly),
    RegisterSpec::new(Register::PulseWidth, 13, ValueKind::U32, ReadWrite),
    RegisterSpec::new(Register::Delay, 14, ValueKind::U32, ReadWrite),
    RegisterSpec::new(Register::OffsetCurrent, 15, ValueKind::F32, ReadWrite),
    RegisterSpec::new(Register::Current, 16, ValueKind::F32, ReadWrite),
    RegisterSpec::new(Register::Temperature, 17, ValueKind::F32, ReadOnly),
    RegisterSpec::new(Register::MaximumCurrent, 20, ValueKind::F32, ReadOnly),
    RegisterSpec::new(Register::CurrentSource, 21, ValueKind::U8, ReadWrite),
    RegisterSpec::new(Register::InterlockStatus, 26, ValueKind::U8, ReadOnly),
    RegisterSpec::new(Register::LaserActivation, 27, ValueKind::U8, ReadWrite),
    RegisterSpec::new(Register::SoftwareControlMode, 31, ValueKind::U8, ReadWrite)
        .since(ProtocolVersion::V3_7),
    RegisterSpec::new(Register::ControlModeSelection, 32, ValueKind::U8, ReadWrite)
        .since(ProtocolVersion::V3_7),
];

/// A decoded register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    U8(u8),
    U32(u32),
    F32(f32),
}

impl RegisterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            RegisterValue::U8(_) => ValueKind::U8,
            RegisterValue::U32(_) => ValueKind::U32,
            RegisterValue::F32(_) => ValueKind::F32,
        }
    }

    /// Append the big-endian encoding to `dst`.
    pub fn put(&self, dst: &mut impl BufMut) {
        match *self {
            RegisterValue::U8(v) => dst.put_u8(v),
            RegisterValue::U32(v) => dst.put_u32(v),
            RegisterValue::F32(v) => dst.put_f32(v),
        }
    }

    /// Decode a value of `kind` from exactly `kind.width()` bytes.
    pub fn decode(kind: ValueKind, data: &[u8]) -> Result<Self> {
        if data.len() != kind.width() {
            return Err(FrameError::Malformed(format!(
                "{kind} value must be {} bytes, got {}",
                kind.width(),
                data.len()
            )));
        }
        let value = match kind {
            ValueKind::U8 => RegisterValue::U8(data[0]),
            ValueKind::U32 => {
                RegisterValue::U32(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
            ValueKind::F32 => {
                RegisterValue::F32(f32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
        };
        Ok(value)
    }

    pub fn as_u8(&self) -> Option<u8> {
        match *self {
            RegisterValue::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            RegisterValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            RegisterValue::F32(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::U8(v) => write!(f, "{v}"),
            RegisterValue::U32(v) => write!(f, "{v}"),
            RegisterValue::F32(v) => write!(f, "{v}"),
        }
    }
}
