//! Host-side driver for PDM pulsed laser-diode modules.
//!
//! Several modules can share one serial cable, each answering to its own
//! address. pdmlink frames and checksums requests, serializes them over the
//! shared connection, negotiates the protocol version, and exposes each
//! module's registers as typed values.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transport abstraction and serial port
//! - [`frame`]: frame codec, commands, status codes, register table
//! - [`session`]: shared [`Link`] and per-module [`Pdm`] sessions
//!
//! ```no_run
//! use pdmlink::{Pdm, SyncSource};
//!
//! let mut pdm = Pdm::open(1, "/dev/ttyUSB0")?;
//! pdm.set_sync_source(SyncSource::Internal)?;
//! pdm.set_offset_current(30.0)?;
//! pdm.apply()?;
//! println!("{} °C", pdm.temperature()?);
//! # Ok::<(), pdmlink::PdmError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use pdmlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pdmlink_frame::*;
}

/// Re-export link and session types.
pub mod session {
    pub use pdmlink_session::*;
}

pub use pdmlink_frame::{ProtocolVersion, Register, RegisterValue, Status, VersionRange};
pub use pdmlink_session::{
    ControlMode, CurrentSource, DelayLineType, Link, LinkConfig, LinkState, Mode, Pdm, PdmError,
    Result, SyncSource,
};
