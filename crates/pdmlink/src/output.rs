use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pdmlink_frame::{Register, RegisterValue};
use pdmlink_session::{ControlMode, CurrentSource, DelayLineType, Mode, SyncSource};
use serde::Serialize;

use crate::exit::{CliError, CliResult, INTERNAL};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One register value as shown to the user.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Reading {
    pub register: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "no_unit")]
    pub unit: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    pub fn new(register: Register, value: Result<RegisterValue, String>) -> Self {
        let (value, error) = match value {
            Ok(value) => (Some(describe(register, value)), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            register: register.name(),
            value,
            unit: unit(register),
            error,
        }
    }

    fn value_or_error(&self) -> String {
        match (&self.value, &self.error) {
            (Some(value), _) => value.clone(),
            (None, Some(err)) => format!("<{err}>"),
            (None, None) => String::new(),
        }
    }
}

fn no_unit(unit: &&str) -> bool {
    unit.is_empty()
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string(value)
        .map_err(|err| CliError::new(INTERNAL, format!("cannot encode output: {err}")))?;
    println!("{text}");
    Ok(())
}

pub fn print_readings(readings: &[Reading], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(readings).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REGISTER", "VALUE", "UNIT"]);
            for reading in readings {
                table.add_row(vec![
                    reading.register.to_string(),
                    reading.value_or_error(),
                    reading.unit.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for reading in readings {
                let unit = if reading.unit.is_empty() {
                    String::new()
                } else {
                    format!(" {}", reading.unit)
                };
                println!(
                    "  {:<24} {}{unit}",
                    format!("{}:", reading.register),
                    reading.value_or_error()
                );
            }
        }
        OutputFormat::Raw => {
            for reading in readings {
                println!("{}", reading.value_or_error());
            }
        }
    }
}

/// Human-readable rendering of a register value.
pub fn describe(register: Register, value: RegisterValue) -> String {
    let code = value.as_u8();
    let name = code.and_then(|code| match register {
        Register::SyncSource => SyncSource::from_code(code).map(SyncSource::name),
        Register::DelayLineType => DelayLineType::from_code(code).map(DelayLineType::name),
        Register::CurrentSource => CurrentSource::from_code(code).map(CurrentSource::name),
        Register::SoftwareControlMode => Mode::from_code(code).map(Mode::name),
        Register::ControlModeSelection => ControlMode::from_code(code).map(ControlMode::name),
        Register::LaserActivation | Register::InterlockStatus => match code {
            0 => Some("off"),
            1 => Some("on"),
            _ => None,
        },
        _ => None,
    });
    match name {
        Some(name) => name.to_string(),
        None => value.to_string(),
    }
}

pub fn unit(register: Register) -> &'static str {
    match register {
        Register::Frequency => "Hz",
        Register::PulseWidth | Register::Delay => "ps",
        Register::OffsetCurrent | Register::MaximumCurrent => "mA",
        Register::Current => "%",
        Register::Temperature => "°C",
        _ => "",
    }
}
