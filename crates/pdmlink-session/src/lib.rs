//! Link and device sessions for PDM laser-diode drivers.
//!
//! A [`Link`] owns the transport of one daisy chain. It connects lazily,
//! negotiates the protocol version, serializes every request/response
//! exchange, and retries corrupted or missing responses a bounded number of
//! times. A [`Pdm`] addresses one module through a shared link: getters read
//! the module, setters stage values, and [`Pdm::apply`] writes them.

pub mod error;
mod handshake;
pub mod limits;
pub mod link;
pub mod pdm;
pub mod types;
mod wire;

#[cfg(test)]
mod testing;

pub use error::{PdmError, Result};
pub use limits::{MAX_DELAY, MAX_OFFSET_CURRENT, MAX_PULSE_WIDTH};
pub use link::{Link, LinkConfig, LinkState, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
pub use pdm::Pdm;
pub use types::{ControlMode, CurrentSource, DelayLineType, Mode, SyncSource};
