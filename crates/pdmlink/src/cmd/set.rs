use pdmlink_frame::{Register, RegisterValue, ValueKind};
use pdmlink_session::{ControlMode, CurrentSource, DelayLineType, Mode, SyncSource};
use serde::Serialize;
use tracing::debug;

use crate::cmd::{LinkArgs, SetArgs};
use crate::exit::{pdm_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct SetOutput {
    address: u8,
    staged: Vec<&'static str>,
    written: usize,
}

pub fn run(args: SetArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let assignments = args
        .assignments
        .iter()
        .map(|text| parse_assignment(text))
        .collect::<CliResult<Vec<_>>>()?;

    let mut pdm = link.session(args.address)?;
    for (register, value) in &assignments {
        pdm.stage(*register, *value)
            .map_err(|err| pdm_error("invalid value", err))?;
    }
    let written = pdm
        .apply()
        .map_err(|err| pdm_error("apply failed", err))?;
    debug!(address = args.address, written, "registers applied");

    let out = SetOutput {
        address: pdm.address(),
        staged: assignments.iter().map(|(register, _)| register.name()).collect(),
        written,
    };
    match format {
        OutputFormat::Json => print_json(&out)?,
        OutputFormat::Raw => println!("{}", out.written),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "address {}: {} register(s) written ({})",
                out.address,
                out.written,
                out.staged.join(", ")
            );
        }
    }
    Ok(SUCCESS)
}

/// Parse `register=value`.
fn parse_assignment(text: &str) -> CliResult<(Register, RegisterValue)> {
    let (name, value) = text.split_once('=').ok_or_else(|| {
        CliError::new(USAGE, format!("expected REGISTER=VALUE, got '{text}'"))
    })?;
    let register = name
        .trim()
        .parse::<Register>()
        .map_err(|_| CliError::new(USAGE, format!("unknown register '{}'", name.trim())))?;
    let value = parse_value(register, value.trim())
        .map_err(|reason| CliError::new(USAGE, format!("{register}: {reason}")))?;

    // The session switches the laser off again when the process exits.
    if register == Register::LaserActivation && value == RegisterValue::U8(1) {
        return Err(CliError::new(
            USAGE,
            "laser_activation=on would be undone on exit; keep a session open from the library instead",
        ));
    }
    Ok((register, value))
}

fn parse_value(register: Register, text: &str) -> Result<RegisterValue, String> {
    let kind = register
        .introduced_in()
        .and_then(|version| register.spec(version))
        .map(|spec| spec.kind)
        .ok_or_else(|| "register has no table entry".to_string())?;

    if let Some(code) = enum_code(register, text)? {
        return Ok(RegisterValue::U8(code));
    }

    match kind {
        ValueKind::U8 => text
            .parse::<u8>()
            .map(RegisterValue::U8)
            .map_err(|_| format!("'{text}' is not a valid value")),
        ValueKind::U32 => text
            .parse::<u32>()
            .map(RegisterValue::U32)
            .map_err(|_| format!("'{text}' is not an unsigned integer")),
        ValueKind::F32 => text
            .parse::<f32>()
            .map(RegisterValue::F32)
            .map_err(|_| format!("'{text}' is not a number")),
    }
}

/// Code for a named enum or flag value. Numeric input falls through.
fn enum_code(register: Register, text: &str) -> Result<Option<u8>, String> {
    if text.parse::<u8>().is_ok() {
        return Ok(None);
    }
    let code = match register {
        Register::SyncSource => text.parse::<SyncSource>()?.code(),
        Register::DelayLineType => text.parse::<DelayLineType>()?.code(),
        Register::CurrentSource => text.parse::<CurrentSource>()?.code(),
        Register::SoftwareControlMode => text.parse::<Mode>()?.code(),
        Register::ControlModeSelection => text.parse::<ControlMode>()?.code(),
        Register::LaserActivation => match text.to_ascii_lowercase().as_str() {
            "on" | "true" => 1,
            "off" | "false" => 0,
            _ => return Err(format!("'{text}' is not on/off")),
        },
        _ => return Ok(None),
    };
    Ok(Some(code))
}
