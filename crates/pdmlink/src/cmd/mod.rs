use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use pdmlink_frame::{Address, Register};
use pdmlink_session::{Link, LinkConfig, Pdm, DEFAULT_RETRIES};
use pdmlink_transport::{SerialConnector, SerialSettings, DEFAULT_BAUD_RATE};

use crate::exit::{pdm_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod get;
pub mod info;
pub mod off;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the protocol version and every readable register.
    Info(InfoArgs),
    /// Read one register.
    Get(GetArgs),
    /// Write registers and apply them.
    Set(SetArgs),
    /// Switch laser output off immediately.
    Off(OffArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, link, format),
        Command::Get(args) => get::run(args, link, format),
        Command::Set(args) => set::run(args, link, format),
        Command::Off(args) => off::run(args, link, format),
        Command::Version(args) => version::run(args),
    }
}

/// Serial link settings shared by every subcommand.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial device the chain is attached to (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, env = "PDMLINK_DEVICE", global = true)]
    pub device: Option<String>,
    /// Serial baud rate.
    #[arg(long, env = "PDMLINK_BAUD_RATE", default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud_rate: u32,
    /// Per-attempt response timeout (e.g. 500ms, 1s).
    #[arg(long, env = "PDMLINK_TIMEOUT", default_value = "500ms", global = true)]
    pub timeout: String,
    /// Extra attempts after a corrupted or missing response.
    #[arg(long, env = "PDMLINK_RETRIES", default_value_t = DEFAULT_RETRIES, global = true)]
    pub retries: u32,
}

impl LinkArgs {
    /// Build a link from the flags. No I/O happens until first use.
    pub fn link(&self) -> CliResult<Arc<Link>> {
        let device = self.device.as_deref().ok_or_else(|| {
            CliError::new(
                USAGE,
                "no serial device given (use --device or PDMLINK_DEVICE)",
            )
        })?;
        let timeout = parse_timeout(&self.timeout)?;

        let settings = SerialSettings {
            baud_rate: self.baud_rate,
            timeout,
        };
        let config = LinkConfig::default()
            .with_timeout(timeout)
            .with_retries(self.retries);
        Ok(Arc::new(Link::new(
            SerialConnector::with_settings(device, settings),
            config,
        )))
    }

    /// Open a session on `address` over a fresh link.
    pub fn session(&self, address: Address) -> CliResult<Pdm> {
        let link = self.link()?;
        Pdm::with_link(address, link).map_err(|err| pdm_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Module address on the chain.
    #[arg(long, short = 'a', default_value_t = 1)]
    pub address: Address,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Module address on the chain.
    #[arg(long, short = 'a', default_value_t = 1)]
    pub address: Address,
    /// Register name (e.g. pulse_width, temperature).
    #[arg(value_parser = parse_register)]
    pub register: Register,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Module address on the chain.
    #[arg(long, short = 'a', default_value_t = 1)]
    pub address: Address,
    /// Assignments such as `pulse_width=2500` or `sync_source=internal`.
    #[arg(value_name = "REGISTER=VALUE", required = true)]
    pub assignments: Vec<String>,
}

#[derive(Args, Debug)]
pub struct OffArgs {
    /// Module addresses (comma-separated).
    #[arg(long, short = 'a', value_delimiter = ',', required = true)]
    pub address: Vec<Address>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_register(input: &str) -> Result<Register, String> {
    input.parse::<Register>().map_err(|_| {
        let names: Vec<&str> = Register::ALL.iter().map(|r| r.name()).collect();
        format!("unknown register '{input}' (expected one of {})", names.join(", "))
    })
}

/// Longest per-attempt timeout accepted on the command line.
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    let timeout = match unit {
        "s" => Duration::from_secs(value),
        _ => Duration::from_millis(value),
    };
    if timeout > MAX_TIMEOUT {
        return Err(CliError::new(
            USAGE,
            format!("timeout {input} exceeds {}s", MAX_TIMEOUT.as_secs()),
        ));
    }
    Ok(timeout)
}
