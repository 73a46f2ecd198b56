//! Value checks applied to staged writes and to values read back.

use pdmlink_frame::{Register, RegisterValue};

use crate::error::{PdmError, Result};
use crate::types::{ControlMode, CurrentSource, DelayLineType, Mode, SyncSource};

/// Longest pulse the module accepts, in picoseconds.
pub const MAX_PULSE_WIDTH: u32 = 1_275_000;

/// Longest delay line setting, in picoseconds.
pub const MAX_DELAY: u32 = 15_000;

/// Highest offset current, in mA.
pub const MAX_OFFSET_CURRENT: f32 = 150.0;

fn enum_code(register: Register, code: u8) -> bool {
    match register {
        Register::SyncSource => SyncSource::from_code(code).is_some(),
        Register::DelayLineType => DelayLineType::from_code(code).is_some(),
        Register::CurrentSource => CurrentSource::from_code(code).is_some(),
        Register::SoftwareControlMode => Mode::from_code(code).is_some(),
        Register::ControlModeSelection => ControlMode::from_code(code).is_some(),
        Register::LaserActivation | Register::InterlockStatus => code <= 1,
        _ => true,
    }
}

/// Reject a value the caller wants to write.
pub(crate) fn check_write(register: Register, value: RegisterValue) -> Result<()> {
    let fail = |reason: String| -> Result<()> { Err(PdmError::invalid(register, reason)) };
    match (register, value) {
        (Register::PulseWidth, RegisterValue::U32(ps)) if ps > MAX_PULSE_WIDTH => {
            fail(format!("{ps} ps exceeds {MAX_PULSE_WIDTH} ps"))
        }
        (Register::Delay, RegisterValue::U32(ps)) if ps > MAX_DELAY => {
            fail(format!("{ps} ps exceeds {MAX_DELAY} ps"))
        }
        (Register::OffsetCurrent, RegisterValue::F32(ma))
            if !(0.0..=MAX_OFFSET_CURRENT).contains(&ma) =>
        {
            fail(format!("{ma} mA outside 0..={MAX_OFFSET_CURRENT} mA"))
        }
        (Register::Current, RegisterValue::F32(pct)) if !(0.0..=100.0).contains(&pct) => {
            fail(format!("{pct} % outside 0..=100 %"))
        }
        (_, RegisterValue::U8(code)) if !enum_code(register, code) => {
            fail(format!("unknown code {code}"))
        }
        _ => Ok(()),
    }
}

/// Reject a value read from the module that it should never report.
pub(crate) fn check_read(register: Register, value: RegisterValue) -> Result<()> {
    let bad = match (register, value) {
        (Register::OffsetCurrent | Register::MaximumCurrent, RegisterValue::F32(ma)) => {
            ma.is_nan() || ma < 0.0
        }
        (Register::Current, RegisterValue::F32(pct)) => !(0.0..=100.0).contains(&pct),
        (_, RegisterValue::U8(code)) => !enum_code(register, code),
        _ => false,
    };
    if bad {
        return Err(PdmError::Protocol(format!(
            "module reported {value} for {register}"
        )));
    }
    Ok(())
}
