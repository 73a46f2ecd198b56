use serde::Serialize;

use crate::cmd::{InfoArgs, LinkArgs};
use crate::exit::{pdm_error, CliResult, SUCCESS};
use crate::output::{print_json, print_readings, OutputFormat, Reading};

#[derive(Serialize)]
struct InfoOutput {
    address: u8,
    protocol_version: String,
    mode: &'static str,
    registers: Vec<Reading>,
}

pub fn run(args: InfoArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut pdm = link.session(args.address)?;

    let mode = pdm.mode().map_err(|err| pdm_error("mode read failed", err))?;

    // Individual register failures are reported inline; the link has
    // already proven itself by this point.
    let registers: Vec<_> = pdm.registers().collect();
    let readings = registers
        .into_iter()
        .map(|register| {
            let value = pdm.read_register(register).map_err(|err| err.to_string());
            Reading::new(register, value)
        })
        .collect();

    let out = InfoOutput {
        address: pdm.address(),
        protocol_version: pdm.version().to_string(),
        mode: mode.name(),
        registers: readings,
    };

    match format {
        OutputFormat::Json => print_json(&out)?,
        OutputFormat::Raw => print_readings(&out.registers, format),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("address:  {}", out.address);
            println!("protocol: {}", out.protocol_version);
            println!("mode:     {}", out.mode);
            print_readings(&out.registers, format);
        }
    }
    Ok(SUCCESS)
}
