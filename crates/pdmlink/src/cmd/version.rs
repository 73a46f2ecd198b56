use pdmlink_frame::VersionRange;
use pdmlink_transport::DEFAULT_BAUD_RATE;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pdmlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pdmlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PDMLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("PDMLINK_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("protocol_versions: {}", VersionRange::default());
    println!("default_baud_rate: {DEFAULT_BAUD_RATE}");

    Ok(SUCCESS)
}
