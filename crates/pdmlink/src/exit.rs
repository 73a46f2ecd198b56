use std::fmt;

use pdmlink_session::PdmError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DEVICE_FAULT: i32 = 40;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const UNSUPPORTED_VERSION: i32 = 69;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn pdm_error(context: &str, err: PdmError) -> CliError {
    let code = match &err {
        PdmError::ConnectionFailure {
            timed_out: true, ..
        } => TIMEOUT,
        PdmError::ConnectionFailure { .. } => TRANSPORT_ERROR,
        PdmError::Checksum { .. } | PdmError::Protocol(_) => DATA_INVALID,
        PdmError::ProtocolVersionNotSupported { .. } => UNSUPPORTED_VERSION,
        PdmError::Status { .. } => DEVICE_FAULT,
        PdmError::InvalidValue { .. } => USAGE,
    };
    CliError::new(code, format!("{context}: {err}"))
}
