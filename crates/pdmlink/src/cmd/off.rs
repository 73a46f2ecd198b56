use serde::Serialize;
use tracing::warn;

use crate::cmd::{LinkArgs, OffArgs};
use crate::exit::{pdm_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct OffResult {
    address: u8,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Deactivate every listed module over one shared link. Keeps going past
/// modules that fail.
pub fn run(args: OffArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let link = link.link()?;

    let mut results = Vec::with_capacity(args.address.len());
    let mut failures: Vec<CliError> = Vec::new();
    for address in args.address {
        let outcome = link
            .deactivate(address)
            .map_err(|err| pdm_error(&format!("address {address}"), err));
        match outcome {
            Ok(()) => results.push(OffResult {
                address,
                ok: true,
                error: None,
            }),
            Err(err) => {
                warn!(address, error = %err, "deactivation failed");
                results.push(OffResult {
                    address,
                    ok: false,
                    error: Some(err.message.clone()),
                });
                failures.push(err);
            }
        }
    }

    match format {
        OutputFormat::Json => print_json(&results)?,
        _ => {
            for result in &results {
                match &result.error {
                    None => println!("address {}: off", result.address),
                    Some(err) => println!("address {}: FAILED ({err})", result.address),
                }
            }
        }
    }

    match failures.len() {
        0 => Ok(SUCCESS),
        1 => Err(failures.remove(0)),
        n => Err(CliError::new(
            FAILURE,
            format!("{n} modules could not be switched off"),
        )),
    }
}
