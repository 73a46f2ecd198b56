use serde::Serialize;

use crate::cmd::{GetArgs, LinkArgs};
use crate::exit::{pdm_error, CliResult, SUCCESS};
use crate::output::{print_json, print_readings, OutputFormat, Reading};

#[derive(Serialize)]
struct GetOutput {
    address: u8,
    #[serde(flatten)]
    reading: Reading,
}

pub fn run(args: GetArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut pdm = link.session(args.address)?;
    let value = pdm
        .read_register(args.register)
        .map_err(|err| pdm_error(&format!("reading {} failed", args.register), err))?;

    let reading = Reading::new(args.register, Ok(value));
    match format {
        OutputFormat::Json => print_json(&GetOutput {
            address: pdm.address(),
            reading,
        })?,
        _ => print_readings(&[reading], format),
    }
    Ok(SUCCESS)
}
